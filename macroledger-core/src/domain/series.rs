use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream series entry before type conversion. Values stay strings because
/// the upstream uses `"."` for missing observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub date: String,
    pub value: String,
}

impl RawEntry {
    pub fn new(date: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            value: value.into(),
        }
    }
}

/// Typed indicator cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// New row for an interval table: one populated column, identifier assigned
/// by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub row_id: i64,
    pub date: NaiveDate,
    pub value: CellValue,
}

/// One cell of a column as read for gap filling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesCell {
    pub date: NaiveDate,
    pub value: Option<CellValue>,
}
