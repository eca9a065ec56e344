//! The CropManage assistant
//!
//! Wraps the API client with the lookups and answers the interactive loop
//! needs. Every public answer is a sentence; transport errors never escape.

use crate::api::fallback::{fetch_with_fallback, ChainError, Fetched, Plantings, WeatherStations};
use crate::api::recommend::{request_recommendation, RecommendationKind};
use crate::api::resolve::{entities_from_listing, resolve, NamedEntity, Resolution};
use crate::api::transport::{ApiRequest, Transport, TransportError};
use crate::config::ApiConfig;
use crate::intent::{Intent, IntentParams};
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Could not load {what}: {source}")]
    Listing {
        what: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("'{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub struct CropManageAgent<T> {
    transport: T,
    config: ApiConfig,
}

impl<T: Transport> CropManageAgent<T> {
    pub fn new(transport: T, config: ApiConfig) -> Self {
        Self { transport, config }
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    async fn listing(&self, url: String, what: &'static str) -> Result<Vec<NamedEntity>, LookupError> {
        let request = ApiRequest::get(url, self.config.listing_timeout);
        self.transport
            .send(&request)
            .await
            .map(|body| entities_from_listing(&body))
            .map_err(|source| LookupError::Listing { what, source })
    }

    pub async fn list_ranches(&self) -> Result<Vec<NamedEntity>, LookupError> {
        self.listing(self.config.ranches_url(), "ranches").await
    }

    pub async fn list_crop_types(&self) -> Result<Vec<NamedEntity>, LookupError> {
        self.listing(self.config.crop_types_url(), "crops").await
    }

    /// Lower-cased ranch names; empty (with a warning) when the listing fails.
    pub async fn location_names(&self) -> Vec<String> {
        names_or_empty(self.list_ranches().await)
    }

    /// Lower-cased crop names; empty (with a warning) when the listing fails.
    pub async fn crop_names(&self) -> Vec<String> {
        names_or_empty(self.list_crop_types().await)
    }

    /// Resolve against a fresh ranch listing.
    pub async fn resolve_ranch(&self, name: &str) -> Result<Resolution, LookupError> {
        Ok(resolve(name, &self.list_ranches().await?))
    }

    /// Resolve against a fresh crop-type listing.
    pub async fn resolve_crop(&self, name: &str) -> Result<Resolution, LookupError> {
        Ok(resolve(name, &self.list_crop_types().await?))
    }

    // ------------------------------------------------------------------
    // Per-ranch resources
    // ------------------------------------------------------------------

    pub async fn plantings(&self, ranch_name: &str, query: Plantings) -> Result<Fetched, LookupError> {
        let ranch = self.resolve_ranch(ranch_name).await?;
        if !ranch.is_addressable() {
            return Err(LookupError::NotFound(ranch_name.to_string()));
        }
        Ok(fetch_with_fallback(&self.transport, &self.config, &query, &ranch).await?)
    }

    pub async fn count_plantings(&self, ranch_name: &str) -> String {
        match self.plantings(ranch_name, Plantings::default()).await {
            Ok(fetched) => {
                let count = fetched.payload.as_array().map(Vec::len).unwrap_or(0);
                format!("🌱 You have {} active plantings in {}.", count, ranch_name)
            }
            Err(LookupError::NotFound(_)) => format!("❌ Ranch '{}' not found", ranch_name),
            Err(LookupError::Chain(err)) => format!("❌ Failed to fetch plantings: {}", err),
            Err(err) => format!("❌ {}", err),
        }
    }

    pub async fn weather(&self, location: &str) -> String {
        let ranch = match self.resolve_ranch(location).await {
            Ok(ranch) if ranch.is_addressable() => ranch,
            Ok(_) => return "❌ Location not found".to_string(),
            Err(err) => return format!("❌ {}", err),
        };

        match fetch_with_fallback(&self.transport, &self.config, &WeatherStations, &ranch).await {
            Ok(fetched) => describe_weather(&fetched.payload),
            Err(ChainError::Exhausted { last_error, .. }) => {
                format!("❌ Weather data unavailable: {}", last_error)
            }
            Err(err) => format!("❌ Weather data unavailable: {}", err),
        }
    }

    // ------------------------------------------------------------------
    // Recommendations
    // ------------------------------------------------------------------

    pub async fn recommendation(&self, kind: RecommendationKind, crop: &str, location: &str) -> String {
        self.recommendation_on(kind, crop, location, chrono::Local::now().date_naive())
            .await
    }

    pub async fn recommendation_on(
        &self,
        kind: RecommendationKind,
        crop: &str,
        location: &str,
        today: NaiveDate,
    ) -> String {
        let crop_ids = match self.resolve_crop(crop).await {
            Ok(ids) => ids,
            Err(err) => return format!("❌ {} recommendation failed: {}", kind.title(), err),
        };
        let ranch_ids = match self.resolve_ranch(location).await {
            Ok(ids) => ids,
            Err(err) => return format!("❌ {} recommendation failed: {}", kind.title(), err),
        };
        request_recommendation(&self.transport, &self.config, kind, &crop_ids, &ranch_ids, today)
            .await
    }

    // ------------------------------------------------------------------
    // Intent routing
    // ------------------------------------------------------------------

    pub async fn handle_intent(&self, intent: Intent, params: &IntentParams) -> String {
        let crop = params.crop.as_deref().filter(|s| !s.trim().is_empty());
        let location = params.location.as_deref().filter(|s| !s.trim().is_empty());

        match intent {
            Intent::Irrigation | Intent::Fertilizer => {
                let (Some(crop), Some(location)) = (crop, location) else {
                    return "❌ Please specify crop and location".to_string();
                };
                let kind = if intent == Intent::Irrigation {
                    RecommendationKind::Irrigation
                } else {
                    RecommendationKind::Fertilizer
                };
                self.recommendation(kind, crop, location).await
            }
            Intent::Weather => match location {
                Some(location) => self.weather(location).await,
                None => "❌ Please specify location".to_string(),
            },
            Intent::PlantingsCount => match location {
                Some(location) => self.count_plantings(location).await,
                None => {
                    "❌ Please specify ranch (e.g., 'How many plantings in Pryor Ranch?')".to_string()
                }
            },
            Intent::SoilStatus | Intent::Unknown => "❌ Intent not recognized".to_string(),
        }
    }
}

fn names_or_empty(listing: Result<Vec<NamedEntity>, LookupError>) -> Vec<String> {
    match listing {
        Ok(entities) => entities.iter().map(|e| e.name.to_lowercase()).collect(),
        Err(err) => {
            tracing::warn!("{}", err);
            Vec::new()
        }
    }
}

fn describe_weather(payload: &Value) -> String {
    let station = payload
        .as_array()
        .and_then(|stations| stations.first())
        .unwrap_or(&Value::Null);
    let field = |key: &str| match station.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "?".to_string(),
        Some(other) => other.to_string(),
    };
    format!(
        "Current weather: {}°C, {}, Wind: {} kph",
        field("temp_c"),
        field("conditions"),
        field("wind_speed")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fallback::AttemptKind;
    use crate::api::transport::fake::FakeTransport;
    use serde_json::json;

    const RANCHES: &str = "https://cm.test/v2/ranches.json";
    const CROPS: &str = "https://cm.test/v2/crop-types.json";
    const PLANTINGS_GUID: &str = "https://cm.test/v2/ranches/g-99/plantings.json?active=true";
    const PLANTINGS_ID: &str =
        "https://cm.test/v2/plantings/list-by-ranch.json?ranchId=12&active=true";

    fn agent(transport: FakeTransport) -> CropManageAgent<FakeTransport> {
        CropManageAgent::new(transport, ApiConfig::new("https://cm.test").unwrap())
    }

    fn pryor_listing() -> Value {
        json!([{"Name": "Pryor Ranch", "Id": 12, "Ranch_External_GUID": "g-99"}])
    }

    #[tokio::test]
    async fn test_pryor_scenario_hits_guid_path_first() {
        let agent = agent(
            FakeTransport::new()
                .respond(RANCHES, pryor_listing())
                .respond(PLANTINGS_GUID, json!([{"Id": 1}, {"Id": 2}, {"Id": 3}])),
        );

        let ranch = agent.resolve_ranch("pryor ranch").await.unwrap();
        assert_eq!(ranch.numeric_id, Some(12));
        assert_eq!(ranch.external_guid.as_deref(), Some("g-99"));

        let fetched = agent.plantings("pryor ranch", Plantings::default()).await.unwrap();
        assert_eq!(fetched.via, AttemptKind::Preferred);
        assert_eq!(
            agent.transport.call_urls(),
            vec![RANCHES, RANCHES, PLANTINGS_GUID]
        );
    }

    #[tokio::test]
    async fn test_count_plantings_uses_fallback_when_guid_fails() {
        let agent = agent(
            FakeTransport::new()
                .respond(RANCHES, pryor_listing())
                .fail(PLANTINGS_GUID, 500)
                .respond(PLANTINGS_ID, json!([{"Id": 1}, {"Id": 2}])),
        );
        assert_eq!(
            agent.count_plantings("Pryor Ranch").await,
            "🌱 You have 2 active plantings in Pryor Ranch."
        );
    }

    #[tokio::test]
    async fn test_count_plantings_unknown_ranch() {
        let agent = agent(FakeTransport::new().respond(RANCHES, pryor_listing()));
        assert_eq!(
            agent.count_plantings("Nowhere").await,
            "❌ Ranch 'Nowhere' not found"
        );
        assert_eq!(agent.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_weather_renders_first_station() {
        let agent = agent(
            FakeTransport::new().respond(RANCHES, pryor_listing()).respond(
                "https://cm.test/v2/weather/stations.json?ranchGuid=g-99",
                json!([{"temp_c": 18.5, "conditions": "Sunny"}]),
            ),
        );
        assert_eq!(
            agent.weather("pryor ranch").await,
            "Current weather: 18.5°C, Sunny, Wind: ? kph"
        );
    }

    #[tokio::test]
    async fn test_weather_exhausted_and_missing() {
        let agent = agent(FakeTransport::new().respond(RANCHES, pryor_listing()));
        let out = agent.weather("pryor ranch").await;
        assert!(out.starts_with("❌ Weather data unavailable:"), "{}", out);
        assert_eq!(agent.weather("elsewhere").await, "❌ Location not found");
    }

    #[tokio::test]
    async fn test_listing_failure_is_a_sentence() {
        let agent = agent(FakeTransport::new().fail(RANCHES, 401));
        let out = agent.weather("pryor ranch").await;
        assert!(out.starts_with("❌ Could not load ranches:"), "{}", out);
        assert!(agent.location_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_resolves_both_names() {
        let agent = agent(
            FakeTransport::new()
                .respond(RANCHES, pryor_listing())
                .respond(CROPS, json!([{"Name": "Lettuce", "Id": 5}]))
                .respond(
                    "https://cm.test/v2/irrigation-recommendation.json",
                    json!({"recommended": "0.75"}),
                ),
        );
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let out = agent
            .recommendation_on(RecommendationKind::Irrigation, " LETTUCE ", "pryor ranch", today)
            .await;
        assert_eq!(out, "Recommended irrigation: 0.75 inches");

        let out = agent
            .recommendation_on(RecommendationKind::Irrigation, "kale", "pryor ranch", today)
            .await;
        assert_eq!(out, "❌ Invalid crop or location");
    }

    #[tokio::test]
    async fn test_intent_router_validates_parameters() {
        let agent = agent(FakeTransport::new());
        let none = IntentParams::default();
        assert_eq!(
            agent.handle_intent(Intent::Irrigation, &none).await,
            "❌ Please specify crop and location"
        );
        assert_eq!(
            agent.handle_intent(Intent::Weather, &none).await,
            "❌ Please specify location"
        );
        assert!(agent
            .handle_intent(Intent::PlantingsCount, &none)
            .await
            .starts_with("❌ Please specify ranch"));
        assert_eq!(
            agent.handle_intent(Intent::SoilStatus, &none).await,
            "❌ Intent not recognized"
        );
        assert!(agent.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_names_are_lowercased() {
        let agent = agent(
            FakeTransport::new()
                .respond(RANCHES, pryor_listing())
                .respond(CROPS, json!([{"Name": "Lettuce", "Id": 5}, {"Name": "Strawberry", "Id": 6}])),
        );
        assert_eq!(agent.location_names().await, vec!["pryor ranch"]);
        assert_eq!(agent.crop_names().await, vec!["lettuce", "strawberry"]);
    }
}
