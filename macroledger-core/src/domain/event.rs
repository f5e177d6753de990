//! Asset lifecycle events and their identity.

use crate::normalize::{date_key, quarter_label};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Kind of asset lifecycle event. The numeric code is what the store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Dividend,
    Earnings,
    Split,
    Rate,
}

impl EventKind {
    pub fn code(self) -> i64 {
        match self {
            EventKind::Dividend => 1,
            EventKind::Earnings => 2,
            EventKind::Split => 3,
            EventKind::Rate => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EventKind::Dividend),
            2 => Some(EventKind::Earnings),
            3 => Some(EventKind::Split),
            4 => Some(EventKind::Rate),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Dividend => "dividend",
            EventKind::Earnings => "earnings",
            EventKind::Split => "split",
            EventKind::Rate => "rate",
        };
        f.write_str(name)
    }
}

/// Estimate carried by a forward-calendar earnings row. Its presence, even
/// with no value, marks the row as an expected placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EstimateMarker(pub Option<String>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarningsDetail {
    pub quarter: Option<String>,
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimateMarker>,
}

/// Kind-specific payload, serialized as the canonical detail JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventDetail {
    Earnings(EarningsDetail),
    Dividend { dividend_amount: Option<String> },
    Split { split_ratio: Option<String> },
    Rate { fvalue: String },
}

impl EventDetail {
    /// Canonical JSON form written to the store.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Fiscal quarter label and year, e.g. `("Q1", 2024)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuarterYear {
    pub quarter: String,
    pub year: i32,
}

impl QuarterYear {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            quarter: quarter_label(date),
            year: date.year(),
        }
    }
}

/// `(kind, announcement_date, start_date)` with dates rendered as
/// `YYYY-MM-DD` and absent dates as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventIdentityKey {
    pub kind_code: i64,
    pub announcement: String,
    pub start: String,
}

impl EventIdentityKey {
    pub fn new(kind_code: i64, announcement: Option<NaiveDate>, start: Option<NaiveDate>) -> Self {
        Self {
            kind_code,
            announcement: date_key(announcement),
            start: date_key(start),
        }
    }
}

impl fmt::Display for EventIdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind_code, self.announcement, self.start)
    }
}

/// Canonical event produced by the normalizer for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub announcement_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub detail: EventDetail,
    pub active: bool,
}

impl Event {
    pub fn new(
        kind: EventKind,
        announcement_date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        detail: EventDetail,
    ) -> Self {
        Self {
            kind,
            announcement_date,
            start_date,
            detail,
            active: true,
        }
    }

    pub fn identity_key(&self) -> EventIdentityKey {
        EventIdentityKey::new(self.kind.code(), self.announcement_date, self.start_date)
    }

    /// Confirmed earnings result: earnings kind without an estimate marker.
    pub fn is_actual_earnings(&self) -> bool {
        matches!(
            (&self.kind, &self.detail),
            (EventKind::Earnings, EventDetail::Earnings(d)) if d.estimate.is_none()
        )
    }

    pub fn is_expected_earnings(&self) -> bool {
        self.kind == EventKind::Earnings && !self.is_actual_earnings()
    }

    /// Quarter/year from the detail payload, else derived from start then
    /// announcement date.
    pub fn quarter_year(&self) -> Option<QuarterYear> {
        if let EventDetail::Earnings(EarningsDetail {
            quarter: Some(quarter),
            year: Some(year),
            ..
        }) = &self.detail
        {
            return Some(QuarterYear {
                quarter: quarter.clone(),
                year: *year,
            });
        }
        self.start_date.or(self.announcement_date).map(QuarterYear::of)
    }

    /// Tie-break rank among events sharing an announcement date, in tenths of
    /// the kind code: actual earnings (21) before expected earnings (22),
    /// everything else at its kind code.
    pub fn sort_priority(&self) -> u32 {
        match self.kind {
            EventKind::Earnings if self.is_actual_earnings() => 21,
            EventKind::Earnings => 22,
            other => other.code() as u32 * 10,
        }
    }
}

/// Orders events by announcement date ascending (undated last), then by
/// [`Event::sort_priority`]. Stable, so equal events keep fetch order.
pub fn sort_for_reconciliation(events: &mut [Event]) {
    events.sort_by(compare_for_reconciliation);
}

fn compare_for_reconciliation(a: &Event, b: &Event) -> Ordering {
    let date_order = match (a.announcement_date, b.announcement_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    date_order.then_with(|| a.sort_priority().cmp(&b.sort_priority()))
}

/// Event row as read back from the store. The detail stays raw JSON because
/// rows written by older loaders may not follow the canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub pk: i64,
    pub kind_code: i64,
    pub announcement_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub detail: Value,
}

impl StoredEvent {
    pub fn identity_key(&self) -> EventIdentityKey {
        EventIdentityKey::new(self.kind_code, self.announcement_date, self.start_date)
    }

    fn is_earnings(&self) -> bool {
        self.kind_code == EventKind::Earnings.code()
    }

    /// Expected-earnings placeholder: earnings row whose detail carries an
    /// estimate field or a calendar source tag. Unparseable detail text is
    /// searched for the same markers.
    pub fn is_placeholder(&self) -> bool {
        if !self.is_earnings() {
            return false;
        }
        match &self.detail {
            Value::Object(map) => {
                map.contains_key("estimate")
                    || map.get("source").and_then(Value::as_str) == Some("earnings_calendar")
            }
            Value::String(raw) => raw.contains("earnings_calendar") || raw.contains("estimate"),
            _ => false,
        }
    }

    pub fn is_actual_earnings(&self) -> bool {
        self.is_earnings() && !self.is_placeholder()
    }

    pub fn quarter_year(&self) -> Option<QuarterYear> {
        let (quarter, year) = match &self.detail {
            Value::Object(map) => (
                map.get("quarter").or_else(|| map.get("q")).and_then(quarter_from_json),
                map.get("year").or_else(|| map.get("y")).and_then(year_from_json),
            ),
            _ => (None, None),
        };
        match (quarter, year) {
            (Some(quarter), Some(year)) => Some(QuarterYear { quarter, year }),
            _ => self.start_date.or(self.announcement_date).map(QuarterYear::of),
        }
    }
}

fn quarter_from_json(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n.as_u64().filter(|q| (1..=4).contains(q)).map(|q| format!("Q{q}")),
        _ => None,
    }
}

fn year_from_json(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}
