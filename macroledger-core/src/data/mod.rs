//! Upstream access: source traits, response shapes, and the HTTP client.

pub mod alpha_vantage;
pub mod circuit_breaker;
pub mod payload;
pub mod provider;

pub use alpha_vantage::{AlphaVantageClient, AlphaVantageConfig};
pub use circuit_breaker::CircuitBreaker;
pub use payload::{EventPayload, SeriesPayload};
pub use provider::{EventFeed, EventResponse, EventSource, FetchError, RawBody, SeriesSource};
