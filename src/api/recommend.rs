//! Irrigation and fertilizer recommendation requests
//!
//! Builds the POST body for a resolved crop/ranch pair and turns whatever the
//! backend answers into one sentence. Failures come back as sentences too.

use super::resolve::Resolution;
use super::transport::{ApiRequest, Transport};
use crate::config::ApiConfig;
use chrono::NaiveDate;
use serde_json::{json, Value};

/// Backend contract constant for irrigation requests
pub const DISTRIBUTION_UNIFORMITY: f64 = 85.0;
/// Backend contract constant for fertilizer requests
pub const FERTILIZER_RECOMMENDATION_TYPE: &str = "nitrogen";

pub const INVALID_CROP_OR_LOCATION: &str = "❌ Invalid crop or location";

const WATER_KEYS: &[&str] = &["RecommendedWater", "recommended", "amount", "Amount"];
const AMOUNT_KEYS: &[&str] = &["amount", "Amount"];
const UNIT_KEYS: &[&str] = &["unit", "Unit"];
const NUTRIENT_KEYS: &[&str] = &["nutrient", "Nutrient"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationKind {
    Irrigation,
    Fertilizer,
}

impl RecommendationKind {
    pub fn title(&self) -> &'static str {
        match self {
            RecommendationKind::Irrigation => "Irrigation",
            RecommendationKind::Fertilizer => "Fertilizer",
        }
    }

    fn url(&self, config: &ApiConfig) -> String {
        match self {
            RecommendationKind::Irrigation => config.irrigation_url(),
            RecommendationKind::Fertilizer => config.fertilizer_url(),
        }
    }

    /// Request body for this kind. Field names are the backend's.
    pub fn body(&self, crop_type_id: i64, ranch_id: i64, today: NaiveDate) -> Value {
        match self {
            RecommendationKind::Irrigation => json!({
                "EventDate": today.format("%Y-%m-%d").to_string(),
                "CropTypeId": crop_type_id,
                "RanchId": ranch_id,
                "DistributionUniformity": DISTRIBUTION_UNIFORMITY,
            }),
            RecommendationKind::Fertilizer => json!({
                "CropTypeId": crop_type_id,
                "RanchId": ranch_id,
                "RecommendationType": FERTILIZER_RECOMMENDATION_TYPE,
            }),
        }
    }

    /// Render a successful response. `Err` carries the reason the body was unusable.
    pub fn render(&self, payload: &Value) -> Result<String, String> {
        match self {
            RecommendationKind::Irrigation => {
                let amount = irrigation_amount(payload)?;
                Ok(format!("Recommended irrigation: {:.2} inches", amount))
            }
            RecommendationKind::Fertilizer => Ok(fertilizer_summary(payload)),
        }
    }
}

fn first_present<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !v.is_null())
}

/// Water amount in inches, tolerating the field-name drift seen across API versions.
pub fn irrigation_amount(payload: &Value) -> Result<f64, String> {
    match first_present(payload, WATER_KEYS) {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("unexpected amount '{}'", n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("unexpected amount '{}'", s)),
        Some(other) => Err(format!("unexpected amount '{}'", other)),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn fertilizer_summary(payload: &Value) -> String {
    let amount = first_present(payload, AMOUNT_KEYS)
        .map(display_value)
        .unwrap_or_else(|| "0".to_string());
    let unit = first_present(payload, UNIT_KEYS)
        .map(display_value)
        .unwrap_or_else(|| "units".to_string());
    let nutrient = first_present(payload, NUTRIENT_KEYS)
        .map(display_value)
        .unwrap_or_else(|| "N".to_string());
    format!("Apply {} {} of {}", amount, unit, nutrient)
}

/// POST one recommendation request and describe the result.
///
/// No request is made unless both the crop and the ranch resolved to a numeric id.
pub async fn request_recommendation<T: Transport>(
    transport: &T,
    config: &ApiConfig,
    kind: RecommendationKind,
    crop: &Resolution,
    ranch: &Resolution,
    today: NaiveDate,
) -> String {
    let (Some(crop_type_id), Some(ranch_id)) = (crop.numeric_id, ranch.numeric_id) else {
        return INVALID_CROP_OR_LOCATION.to_string();
    };

    let request = ApiRequest::post_json(
        kind.url(config),
        kind.body(crop_type_id, ranch_id, today),
        config.request_timeout,
    );

    match transport.send(&request).await {
        Ok(payload) => kind
            .render(&payload)
            .unwrap_or_else(|reason| failure(kind, &reason)),
        Err(err) => failure(kind, &err.to_string()),
    }
}

fn failure(kind: RecommendationKind, reason: &str) -> String {
    format!("❌ {} recommendation failed: {}", kind.title(), reason)
}
