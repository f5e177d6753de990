//! Event normalizer: one function per feed and payload shape, each producing
//! canonical [`Event`]s for a single asset.

use crate::data::{EventFeed, EventPayload};
use crate::domain::{EarningsDetail, EstimateMarker, Event, EventDetail, EventKind, RawEntry};
use crate::normalize::{first_scalar, is_missing_marker, parse_date, quarter_label, split_ratio};
use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

const DIVIDEND_AMOUNT_KEYS: [&str; 4] = ["dividend_amount", "dividend", "amount", "value"];
const SPLIT_FACTOR_KEYS: [&str; 5] = ["split_factor", "split_coefficient", "split_ratio", "splitFactor", "factor"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Symbol mismatch in {feed}: expected {expected}, got {got}")]
    SymbolMismatch {
        feed: EventFeed,
        expected: String,
        got: String,
    },

    #[error("Unexpected {shape} payload for {feed}")]
    UnexpectedShape { feed: EventFeed, shape: &'static str },

    #[error("Malformed {feed} payload: {reason}")]
    Malformed { feed: EventFeed, reason: String },
}

/// Maps one feed's payload into canonical events for `symbol`.
pub fn normalize_feed(symbol: &str, feed: EventFeed, payload: EventPayload) -> Result<Vec<Event>, NormalizeError> {
    if let Some(got) = payload.symbol() {
        if !got.eq_ignore_ascii_case(symbol) {
            return Err(NormalizeError::SymbolMismatch {
                feed,
                expected: symbol.to_string(),
                got,
            });
        }
    }

    match (feed, payload) {
        (EventFeed::EarningsCalendar, EventPayload::Delimited(text)) => calendar_from_csv(symbol, &text),
        (EventFeed::EarningsCalendar, EventPayload::Array(records))
        | (EventFeed::EarningsCalendar, EventPayload::Nested { records, .. }) => {
            Ok(records
                .iter()
                .filter(|rec| record_is_for(rec, symbol))
                .filter_map(calendar_from_record)
                .collect())
        }
        (EventFeed::Earnings, EventPayload::Object(map)) => Ok(historical_earnings(&named_array(&map, "quarterlyEarnings"))),
        (EventFeed::Earnings, EventPayload::Array(records))
        | (EventFeed::Earnings, EventPayload::Nested { records, .. }) => Ok(historical_earnings(&records)),
        (EventFeed::Dividends, EventPayload::Array(records))
        | (EventFeed::Dividends, EventPayload::Nested { records, .. }) => {
            Ok(records.iter().filter_map(dividend_from_record).collect())
        }
        (EventFeed::Splits, EventPayload::Array(records))
        | (EventFeed::Splits, EventPayload::Nested { records, .. }) => {
            Ok(records.iter().filter_map(split_from_record).collect())
        }
        // An object without the records field means no events for this feed.
        (EventFeed::Dividends | EventFeed::Splits | EventFeed::EarningsCalendar, EventPayload::Object(_)) => Ok(Vec::new()),
        (feed, payload) => Err(NormalizeError::UnexpectedShape {
            feed,
            shape: payload.shape_name(),
        }),
    }
}

fn named_array(map: &Map<String, Value>, key: &str) -> Vec<Value> {
    match map.get(key) {
        Some(Value::Array(records)) => records.clone(),
        _ => Vec::new(),
    }
}

/// Reported quarterly results. The report must not precede the fiscal period end.
fn historical_earnings(records: &[Value]) -> Vec<Event> {
    records
        .iter()
        .filter_map(|rec| {
            let fiscal = first_scalar(rec, &["fiscalDateEnding"]).and_then(|s| parse_date(&s))?;
            let reported = first_scalar(rec, &["reportedDate"]).and_then(|s| parse_date(&s))?;
            (reported >= fiscal).then(|| {
                Event::new(
                    EventKind::Earnings,
                    Some(fiscal),
                    Some(reported),
                    EventDetail::Earnings(EarningsDetail {
                        quarter: Some(quarter_label(fiscal)),
                        year: Some(fiscal.year()),
                        estimate: None,
                    }),
                )
            })
        })
        .collect()
}

fn expected_earnings(fiscal: Option<NaiveDate>, report: NaiveDate, estimate: Option<String>) -> Event {
    let period = fiscal.unwrap_or(report);
    Event::new(
        EventKind::Earnings,
        fiscal,
        Some(report),
        EventDetail::Earnings(EarningsDetail {
            quarter: Some(quarter_label(period)),
            year: Some(period.year()),
            estimate: Some(EstimateMarker(estimate)),
        }),
    )
}

/// Market-wide calendar records carry their own symbol; records without one
/// are taken to belong to the requested asset.
fn record_is_for(rec: &Value, symbol: &str) -> bool {
    first_scalar(rec, &["symbol"]).map_or(true, |s| s.eq_ignore_ascii_case(symbol))
}

fn calendar_from_record(rec: &Value) -> Option<Event> {
    let report = first_scalar(rec, &["reportDate", "date"]).and_then(|s| parse_date(&s))?;
    let fiscal = first_scalar(rec, &["fiscalDateEnding"]).and_then(|s| parse_date(&s));
    Some(expected_earnings(fiscal, report, first_scalar(rec, &["estimate"])))
}

/// Forward earnings calendar in delimited form. Rows for other symbols are
/// ignored; the calendar endpoint sometimes returns the whole market.
fn calendar_from_csv(symbol: &str, text: &str) -> Result<Vec<Event>, NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| NormalizeError::Malformed {
            feed: EventFeed::EarningsCalendar,
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect();

    let find = |pred: &dyn Fn(&str) -> bool| headers.iter().position(|h| pred(h));
    let symbol_idx = find(&|h| h.contains("symbol"));
    let date_idx = find(&|h| h.contains("reportdate")).or_else(|| find(&|h| h.contains("date") && !h.contains("fiscal")));
    let fiscal_idx = find(&|h| h.contains("fiscal"));
    let estimate_idx = find(&|h| h.contains("estimate"));

    let (Some(symbol_idx), Some(date_idx)) = (symbol_idx, date_idx) else {
        return Err(NormalizeError::Malformed {
            feed: EventFeed::EarningsCalendar,
            reason: "header row lacks symbol or report date".to_string(),
        });
    };

    let mut events = Vec::new();
    for row in reader.records() {
        let Ok(row) = row else { continue };
        if !row.get(symbol_idx).is_some_and(|s| s.eq_ignore_ascii_case(symbol)) {
            continue;
        }
        let Some(report) = row.get(date_idx).and_then(parse_date) else {
            continue;
        };
        let fiscal = fiscal_idx.and_then(|i| row.get(i)).and_then(parse_date);
        let estimate = estimate_idx
            .and_then(|i| row.get(i))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        events.push(expected_earnings(fiscal, report, estimate));
    }
    Ok(events)
}

fn dividend_from_record(rec: &Value) -> Option<Event> {
    let ex_date = first_scalar(rec, &["ex_dividend_date"]).and_then(|s| parse_date(&s))?;
    let payment = first_scalar(rec, &["payment_date"]).and_then(|s| parse_date(&s));
    Some(Event::new(
        EventKind::Dividend,
        Some(ex_date),
        Some(payment.unwrap_or(ex_date)),
        EventDetail::Dividend {
            dividend_amount: first_scalar(rec, &DIVIDEND_AMOUNT_KEYS),
        },
    ))
}

fn split_from_record(rec: &Value) -> Option<Event> {
    let effective = first_scalar(rec, &["effective_date"]).and_then(|s| parse_date(&s))?;
    let ratio = first_scalar(rec, &SPLIT_FACTOR_KEYS).and_then(|f| split_ratio(&f));
    Some(Event::new(
        EventKind::Split,
        Some(effective),
        Some(effective),
        EventDetail::Split { split_ratio: ratio },
    ))
}

/// Rate-change events shared by every asset: the most recent `periods`
/// observations, one per date.
pub fn rate_events(entries: &[RawEntry], periods: usize) -> Vec<Event> {
    let mut by_date: BTreeMap<NaiveDate, String> = BTreeMap::new();
    for entry in entries {
        if is_missing_marker(&entry.value) {
            continue;
        }
        if let Some(date) = parse_date(&entry.date) {
            by_date.entry(date).or_insert_with(|| entry.value.trim().to_string());
        }
    }
    by_date
        .into_iter()
        .rev()
        .take(periods)
        .map(|(date, fvalue)| Event::new(EventKind::Rate, Some(date), Some(date), EventDetail::Rate { fvalue }))
        .collect()
}
