//! Upstream source traits and structured fetch errors.
//!
//! `SeriesSource` and `EventSource` abstract the market-data vendor so the
//! pipelines can run against the HTTP client or an in-process fake.

use crate::domain::{EventKind, Indicator, Interval};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Structured errors for a single upstream call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by upstream (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from upstream")]
    HttpStatus { status: u16 },

    #[error("hard stop: upstream has refused repeated requests (circuit breaker open)")]
    CircuitBreakerTripped,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),

    #[error("client setup failed: {0}")]
    Client(String),
}

/// Response body as received: parsed JSON, or raw text when the body is not
/// JSON (the earnings calendar is delimited text).
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    Json(Value),
    Text(String),
}

impl RawBody {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => RawBody::Json(value),
            Err(_) => RawBody::Text(text),
        }
    }
}

/// Envelope of an event fetch. A non-200 status or a missing body is a
/// failed call for that feed only.
#[derive(Debug, Clone, PartialEq)]
pub struct EventResponse {
    pub status: u16,
    pub data: Option<RawBody>,
}

impl EventResponse {
    pub fn ok(data: RawBody) -> Self {
        Self {
            status: 200,
            data: Some(data),
        }
    }
}

/// Per-asset event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFeed {
    Earnings,
    EarningsCalendar,
    Dividends,
    Splits,
}

impl EventFeed {
    /// Fetch order for one asset.
    pub const ALL: [EventFeed; 4] = [
        EventFeed::Earnings,
        EventFeed::EarningsCalendar,
        EventFeed::Dividends,
        EventFeed::Splits,
    ];

    pub fn kind(self) -> EventKind {
        match self {
            EventFeed::Earnings | EventFeed::EarningsCalendar => EventKind::Earnings,
            EventFeed::Dividends => EventKind::Dividend,
            EventFeed::Splits => EventKind::Split,
        }
    }

    pub fn function(self) -> &'static str {
        match self {
            EventFeed::Earnings => "EARNINGS",
            EventFeed::EarningsCalendar => "EARNINGS_CALENDAR",
            EventFeed::Dividends => "DIVIDENDS",
            EventFeed::Splits => "SPLITS",
        }
    }
}

impl fmt::Display for EventFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventFeed::Earnings => "earnings",
            EventFeed::EarningsCalendar => "earnings_calendar",
            EventFeed::Dividends => "dividends",
            EventFeed::Splits => "splits",
        };
        f.write_str(name)
    }
}

/// Source of economic indicator series.
pub trait SeriesSource {
    /// Fetch the full upstream series for `indicator` at `interval`.
    /// The body is returned unclassified; its shape varies by vintage.
    fn fetch_series(&self, indicator: Indicator, interval: Interval) -> Result<Value, FetchError>;
}

/// Source of per-asset lifecycle events.
pub trait EventSource {
    fn fetch_events(&self, symbol: &str, feed: EventFeed) -> Result<EventResponse, FetchError>;
}
