//! CropManage REST client
//!
//! Resolution of human-entered names, the GUID → numeric endpoint chain, the
//! token exchange, and recommendation requests.

pub mod auth;
pub mod fallback;
pub mod recommend;
pub mod resolve;
pub mod transport;

pub use fallback::{
    fetch_with_fallback, AttemptKind, AttemptOutcome, ChainError, EndpointAttempt, Fetched,
    Plantings, RanchResource, WeatherStations,
};
pub use recommend::RecommendationKind;
pub use resolve::{resolve, NamedEntity, Resolution};
pub use transport::{ApiRequest, HttpTransport, Transport, TransportError};
