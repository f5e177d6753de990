//! Alpha Vantage upstream client.
//!
//! One blocking `reqwest` client serves both the economic indicator series
//! and the per-asset event feeds. Transient failures (connect/timeout, 429,
//! 5xx) are retried with exponential backoff; sustained failures trip the
//! shared circuit breaker.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{EventFeed, EventResponse, EventSource, FetchError, RawBody, SeriesSource};
use crate::domain::{Indicator, Interval};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Connection settings for the upstream API. Deserialised from the
/// `[upstream]` section of the run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlphaVantageConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

pub struct AlphaVantageClient {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    api_key: String,
    max_retries: u32,
    base_delay: Duration,
}

impl AlphaVantageClient {
    pub fn new(config: &AlphaVantageConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("macroledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            circuit_breaker,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    /// Query parameters for a series request, without the key.
    fn series_params(indicator: Indicator, interval: Interval) -> Vec<(&'static str, String)> {
        let mut params = vec![("function", indicator.function().to_string())];
        if indicator.accepts_interval() {
            params.push(("interval", interval.as_str().to_string()));
        }
        if indicator == Indicator::TreasuryYield {
            params.push(("maturity", "10year".to_string()));
        }
        params
    }

    fn event_params(symbol: &str, feed: EventFeed) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("function", feed.function().to_string()),
            ("symbol", symbol.to_string()),
        ];
        if feed == EventFeed::EarningsCalendar {
            params.push(("horizon", "3month".to_string()));
        }
        params
    }

    /// Issues one GET with retry. Returns the final status and body text for
    /// any response that is not worth retrying.
    fn get_with_retry(&self, params: &[(&'static str, String)]) -> Result<(u16, String), FetchError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(FetchError::CircuitBreakerTripped);
            }

            debug!(?params, attempt, "upstream request");
            let request = self
                .client
                .get(&self.base_url)
                .query(params)
                .query(&[("apikey", self.api_key.as_str())]);

            match request.send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(FetchError::CircuitBreakerTripped);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(FetchError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(FetchError::HttpStatus {
                            status: status.as_u16(),
                        });
                        continue;
                    }

                    let body = resp
                        .text()
                        .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;
                    if status.is_success() {
                        self.circuit_breaker.record_success();
                    }
                    return Ok((status.as_u16(), body));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(FetchError::NetworkUnreachable(e.without_url().to_string()));
                }
                Err(e) => return Err(FetchError::NetworkUnreachable(e.without_url().to_string())),
            }
        }

        let err = last_error.unwrap_or(FetchError::HttpStatus { status: 0 });
        warn!(?params, "upstream retries exhausted: {err}");
        Err(err)
    }
}

impl SeriesSource for AlphaVantageClient {
    fn fetch_series(&self, indicator: Indicator, interval: Interval) -> Result<Value, FetchError> {
        let (status, body) = self.get_with_retry(&Self::series_params(indicator, interval))?;
        if status != 200 {
            return Err(FetchError::HttpStatus { status });
        }
        serde_json::from_str(&body)
            .map_err(|e| FetchError::UnexpectedShape(format!("{indicator} is not JSON: {e}")))
    }
}

impl EventSource for AlphaVantageClient {
    fn fetch_events(&self, symbol: &str, feed: EventFeed) -> Result<EventResponse, FetchError> {
        let (status, body) = self.get_with_retry(&Self::event_params(symbol, feed))?;
        let data = (status == 200 && !body.trim().is_empty()).then(|| RawBody::parse(body));
        Ok(EventResponse { status, data })
    }
}
