//! Preferred → fallback endpoint chain for per-ranch resources
//!
//! A ranch sub-resource can be addressed by the ranch's external GUID or by
//! its numeric id. The GUID shape is preferred; the numeric shape is tried only
//! after the GUID attempt has definitively failed, and never more than once.

use super::resolve::Resolution;
use super::transport::{ApiRequest, Transport};
use crate::config::ApiConfig;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// GUID-addressed
    Preferred,
    /// Numeric-addressed
    Fallback,
}

impl AttemptKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptKind::Preferred => "preferred",
            AttemptKind::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Value),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointAttempt {
    pub kind: AttemptKind,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub outcome: AttemptOutcome,
}

/// First successful payload and the attempts that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Value,
    pub via: AttemptKind,
    pub attempts: Vec<EndpointAttempt>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("no ranch identifier to address {resource}")]
    Unaddressable { resource: &'static str },
    #[error("{resource} unavailable: {last_error}")]
    Exhausted {
        resource: &'static str,
        last_error: String,
        attempts: Vec<EndpointAttempt>,
    },
}

impl ChainError {
    pub fn attempts(&self) -> &[EndpointAttempt] {
        match self {
            ChainError::Unaddressable { .. } => &[],
            ChainError::Exhausted { attempts, .. } => attempts,
        }
    }
}

/// A resource hanging off a ranch, reachable through either addressing scheme.
pub trait RanchResource {
    fn label(&self) -> &'static str;

    fn by_guid(&self, config: &ApiConfig, ranch_guid: &str) -> ApiRequest;

    fn by_id(&self, config: &ApiConfig, ranch_id: i64) -> ApiRequest;

    /// Whether a 2xx body is usable. A rejected body counts as a failed attempt.
    fn accepts(&self, _payload: &Value) -> bool {
        true
    }
}

/// Plantings listed for a ranch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plantings {
    pub active: Option<bool>,
    pub commodity_type_id: Option<i64>,
}

impl Default for Plantings {
    fn default() -> Self {
        Self {
            active: Some(true),
            commodity_type_id: None,
        }
    }
}

impl Plantings {
    fn common_params(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(active) = self.active {
            request = request.with_query("active", active.to_string());
        }
        if let Some(commodity) = self.commodity_type_id {
            request = request.with_query("commodityTypeId", commodity.to_string());
        }
        request
    }
}

impl RanchResource for Plantings {
    fn label(&self) -> &'static str {
        "plantings"
    }

    fn by_guid(&self, config: &ApiConfig, ranch_guid: &str) -> ApiRequest {
        self.common_params(ApiRequest::get(
            config.plantings_by_ranch_guid_url(ranch_guid),
            config.request_timeout,
        ))
    }

    fn by_id(&self, config: &ApiConfig, ranch_id: i64) -> ApiRequest {
        let request = ApiRequest::get(config.plantings_by_ranch_id_url(), config.request_timeout)
            .with_query("ranchId", ranch_id.to_string());
        self.common_params(request)
    }

    fn accepts(&self, payload: &Value) -> bool {
        payload.is_array()
    }
}

/// Weather stations serving a ranch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeatherStations;

impl RanchResource for WeatherStations {
    fn label(&self) -> &'static str {
        "weather data"
    }

    fn by_guid(&self, config: &ApiConfig, ranch_guid: &str) -> ApiRequest {
        ApiRequest::get(config.weather_stations_url(), config.listing_timeout)
            .with_query("ranchGuid", ranch_guid)
    }

    fn by_id(&self, config: &ApiConfig, ranch_id: i64) -> ApiRequest {
        ApiRequest::get(config.weather_stations_url(), config.listing_timeout)
            .with_query("ranchId", ranch_id.to_string())
    }

    /// The station list is useless when empty
    fn accepts(&self, payload: &Value) -> bool {
        payload.as_array().is_some_and(|stations| !stations.is_empty())
    }
}

/// Fetch `resource` for a resolved ranch, GUID first, numeric second.
pub async fn fetch_with_fallback<T, R>(
    transport: &T,
    config: &ApiConfig,
    resource: &R,
    ranch: &Resolution,
) -> Result<Fetched, ChainError>
where
    T: Transport,
    R: RanchResource,
{
    let mut plan = Vec::with_capacity(2);
    if let Some(guid) = ranch.external_guid.as_deref() {
        plan.push((AttemptKind::Preferred, resource.by_guid(config, guid)));
    }
    if let Some(id) = ranch.numeric_id {
        plan.push((AttemptKind::Fallback, resource.by_id(config, id)));
    }
    if plan.is_empty() {
        return Err(ChainError::Unaddressable {
            resource: resource.label(),
        });
    }

    let mut attempts = Vec::with_capacity(plan.len());
    let mut last_error = String::new();

    for (kind, request) in plan {
        let outcome = match transport.send(&request).await {
            Ok(payload) if resource.accepts(&payload) => AttemptOutcome::Success(payload),
            Ok(_) => AttemptOutcome::Failure(format!(
                "unexpected response body from {}",
                request.display_url()
            )),
            Err(err) => AttemptOutcome::Failure(err.to_string()),
        };

        let attempt = EndpointAttempt {
            kind,
            url: request.url.clone(),
            params: request.query.clone(),
            outcome,
        };

        match &attempt.outcome {
            AttemptOutcome::Success(payload) => {
                tracing::debug!("{} fetched via {} endpoint", resource.label(), kind.label());
                let payload = payload.clone();
                attempts.push(attempt);
                return Ok(Fetched {
                    payload,
                    via: kind,
                    attempts,
                });
            }
            AttemptOutcome::Failure(reason) => {
                tracing::warn!(
                    "{} {} attempt failed: {}",
                    resource.label(),
                    kind.label(),
                    reason
                );
                last_error = reason.clone();
                attempts.push(attempt);
            }
        }
    }

    Err(ChainError::Exhausted {
        resource: resource.label(),
        last_error,
        attempts,
    })
}
