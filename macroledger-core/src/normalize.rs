//! Pure conversions from raw upstream scalars into typed values.

use crate::domain::{CellValue, ValueType};
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not convert value '{raw}' to {expected}")]
pub struct ConversionError {
    pub raw: String,
    pub expected: &'static str,
}

/// Parses `YYYY-MM-DD`. Empty strings and `N/A` are absent, not errors.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") || raw == "None" {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// Date rendered for identity keys; absent dates become `""`.
pub fn date_key(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
}

/// Calendar quarter label, `Q1`..`Q4`.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("Q{}", (date.month0() / 3) + 1)
}

/// Upstream placeholder for a missing observation.
pub fn is_missing_marker(raw: &str) -> bool {
    matches!(raw.trim(), "" | ".")
}

/// Converts a raw series value into the column's storage type. Integer
/// columns accept decimal text and truncate toward zero.
pub fn convert_value(raw: &str, value_type: ValueType) -> Result<CellValue, ConversionError> {
    let parsed = raw.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match (value_type, parsed) {
        (ValueType::Float, Some(v)) => Ok(CellValue::Float(v)),
        (ValueType::Integer, Some(v)) if v.abs() < i64::MAX as f64 => {
            Ok(CellValue::Integer(v.trunc() as i64))
        }
        (ValueType::Integer, _) => Err(ConversionError {
            raw: raw.to_string(),
            expected: "integer",
        }),
        (ValueType::Float, None) => Err(ConversionError {
            raw: raw.to_string(),
            expected: "float",
        }),
    }
}

/// Formats a split factor as `N-for-1` or `Reverse N-for-1`.
///
/// Returns `None` for a factor of exactly 1, a non-positive factor, or text
/// that is not a decimal number. Rounding is half-to-even.
pub fn split_ratio(factor: &str) -> Option<String> {
    let factor = factor.trim();
    if factor.is_empty() {
        return None;
    }
    let f = Decimal::from_str(factor)
        .or_else(|_| Decimal::from_scientific(factor))
        .ok()?;
    if f <= Decimal::ZERO || f == Decimal::ONE {
        return None;
    }
    let round = |d: Decimal| {
        d.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
    };
    if f > Decimal::ONE {
        round(f).map(|n| format!("{n}-for-1"))
    } else {
        let inverse = Decimal::ONE.checked_div(f)?;
        round(inverse).map(|n| format!("Reverse {n}-for-1"))
    }
}

/// String form of a JSON scalar. Empty strings, null, and containers are
/// treated as absent.
pub fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present scalar among `keys`.
pub fn first_scalar(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| record.get(*k).and_then(json_scalar))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_only() {
        assert_eq!(parse_date("2024-02-01"), NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(parse_date("N/A"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("02/01/2024"), None);
    }

    #[test]
    fn quarters() {
        let q = |m| quarter_label(NaiveDate::from_ymd_opt(2024, m, 15).unwrap());
        assert_eq!(q(1), "Q1");
        assert_eq!(q(3), "Q1");
        assert_eq!(q(4), "Q2");
        assert_eq!(q(12), "Q4");
    }

    #[test]
    fn convert_integer_truncates_decimal_text() {
        assert_eq!(
            convert_value("158266.0", ValueType::Integer),
            Ok(CellValue::Integer(158266))
        );
        assert_eq!(convert_value("5.5", ValueType::Float), Ok(CellValue::Float(5.5)));
    }

    #[test]
    fn convert_rejects_non_numeric() {
        let err = convert_value("n.a.", ValueType::Float).unwrap_err();
        assert_eq!(err.to_string(), "could not convert value 'n.a.' to float");
        assert!(convert_value("NaN", ValueType::Float).is_err());
        assert!(convert_value("abc", ValueType::Integer).is_err());
    }

    #[test]
    fn missing_markers() {
        assert!(is_missing_marker("."));
        assert!(is_missing_marker(""));
        assert!(!is_missing_marker("0"));
    }

    #[test]
    fn split_ratio_formatting() {
        assert_eq!(split_ratio("2.0").as_deref(), Some("2-for-1"));
        assert_eq!(split_ratio("4").as_deref(), Some("4-for-1"));
        assert_eq!(split_ratio("0.5").as_deref(), Some("Reverse 2-for-1"));
        assert_eq!(split_ratio("0.1").as_deref(), Some("Reverse 10-for-1"));
        assert_eq!(split_ratio("1"), None);
        assert_eq!(split_ratio("1.0000"), None);
        assert_eq!(split_ratio("two"), None);
        assert_eq!(split_ratio(""), None);
        assert_eq!(split_ratio("0"), None);
    }

    #[test]
    fn json_scalars() {
        assert_eq!(json_scalar(&serde_json::json!(0.24)).as_deref(), Some("0.24"));
        assert_eq!(json_scalar(&serde_json::json!(" 0.24 ")).as_deref(), Some("0.24"));
        assert_eq!(json_scalar(&serde_json::json!("")), None);
        assert_eq!(json_scalar(&serde_json::json!(null)), None);
        let rec = serde_json::json!({"amount": "", "value": "1.5"});
        assert_eq!(first_scalar(&rec, &["dividend_amount", "amount", "value"]).as_deref(), Some("1.5"));
    }
}
