//! Storage contract and the SQLite engine behind it.
//!
//! Pipelines only see the traits below: `SeriesStore` for the per-interval
//! indicator tables, `EventStore` for per-asset events, `AssetCatalog` for
//! the provisioned-asset registry.

pub mod schema;
pub mod sqlite;

use crate::domain::{CellValue, Event, Interval, SeriesCell, SeriesColumn, SeriesRow, StoredEvent};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub use sqlite::{ColumnStatus, IntervalStatus, SqliteSession, SqliteStore};

/// Longest asset symbol accepted by the registry.
pub const MAX_SYMBOL_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unsafe asset symbol '{0}': expected 1-{MAX_SYMBOL_LEN} characters of A-Z or 0-9")]
    UnsafeSymbol(String),

    #[error("column {column} is not stored in the {interval} table")]
    UnsupportedColumn { column: String, interval: Interval },

    #[error("corrupt stored value in {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

/// Allow-list for asset symbols: uppercase ASCII letters and digits only.
pub fn is_safe_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

pub fn checked_symbol(symbol: &str) -> Result<&str, StoreError> {
    if is_safe_symbol(symbol) {
        Ok(symbol)
    } else {
        Err(StoreError::UnsafeSymbol(symbol.to_string()))
    }
}

/// Per-interval indicator tables: one row per date, one column per indicator.
pub trait SeriesStore {
    /// Latest date with a non-null value in `column`.
    fn watermark(&self, column: SeriesColumn) -> Result<Option<NaiveDate>, StoreError>;

    /// Row identifiers of the given dates that already have a row.
    fn existing_rows(&self, interval: Interval, dates: &[NaiveDate]) -> Result<HashMap<NaiveDate, i64>, StoreError>;

    fn max_row_id(&self, interval: Interval) -> Result<i64, StoreError>;

    /// Inserts new rows with only `column` populated.
    fn insert_rows(&self, column: SeriesColumn, rows: &[SeriesRow]) -> Result<usize, StoreError>;

    /// Sets `column` on existing rows by identifier.
    fn update_cells(&self, column: SeriesColumn, cells: &[(i64, CellValue)]) -> Result<usize, StoreError>;

    /// Every row of the column's table ordered by date.
    fn column_cells(&self, column: SeriesColumn) -> Result<Vec<SeriesCell>, StoreError>;

    /// Writes `value` into cells that are still null. Returns rows changed.
    fn fill_nulls(&self, column: SeriesColumn, fills: &[(NaiveDate, CellValue)]) -> Result<usize, StoreError>;
}

/// Per-asset event rows.
pub trait EventStore {
    fn load_events(&self, symbol: &str) -> Result<Vec<StoredEvent>, StoreError>;

    fn delete_events(&self, symbol: &str, pks: &[i64]) -> Result<usize, StoreError>;

    /// Replaces the detail payload of one row.
    fn update_detail(&self, symbol: &str, pk: i64, detail: &Value) -> Result<usize, StoreError>;

    /// Appends events with contiguous identifiers after the current maximum.
    fn insert_events(&self, symbol: &str, events: &[Event]) -> Result<usize, StoreError>;
}

pub trait AssetCatalog {
    /// Symbols with a provisioned storage namespace, sorted.
    fn provisioned_assets(&self) -> Result<Vec<String>, StoreError>;

    /// Registers `symbol`. Returns `false` when it was already registered.
    fn provision(&self, symbol: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_allow_list() {
        assert!(is_safe_symbol("AAPL"));
        assert!(is_safe_symbol("BRK2"));
        assert!(!is_safe_symbol(""));
        assert!(!is_safe_symbol("brk.b"));
        assert!(!is_safe_symbol("A-B"));
        assert!(!is_safe_symbol("X\"; DROP TABLE asset_events; --"));
        assert!(!is_safe_symbol("ABCDEFGHIJKLM"));
        assert!(matches!(checked_symbol("a"), Err(StoreError::UnsafeSymbol(_))));
    }
}
