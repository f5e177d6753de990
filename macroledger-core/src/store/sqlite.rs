//! SQLite implementation of the storage contract.
//!
//! `SqliteStore` owns the connection. Work is done through a
//! `SqliteSession`, either in autocommit mode via [`SqliteStore::session`]
//! or inside a transaction via [`SqliteStore::atomic`].

use super::schema::{full_schema, PRAGMAS};
use super::{checked_symbol, AssetCatalog, EventStore, SeriesStore, StoreError};
use crate::domain::{
    columns_for, CellValue, Event, Interval, SeriesCell, SeriesColumn, SeriesRow, StoredEvent, ValueType,
};
use crate::normalize::{parse_date, DATE_FORMAT};
use chrono::{NaiveDate, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match *self {
            CellValue::Integer(v) => ToSqlOutput::from(v),
            CellValue::Float(v) => ToSqlOutput::from(v),
        })
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

/// Deterministic event identifier: BLAKE3 over the asset symbol and the
/// event's identity key.
pub fn event_uid(symbol: &str, event: &Event) -> String {
    let key = event.identity_key();
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b"\0");
    hasher.update(key.to_string().as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Detail JSON as written to the store. Calendar source tags are not persisted.
fn stored_detail(event: &Event) -> Value {
    let mut detail = event.detail.to_json();
    if let Value::Object(map) = &mut detail {
        map.remove("source");
    }
    detail
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatus {
    pub column: String,
    pub populated: u64,
    pub watermark: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalStatus {
    pub interval: Interval,
    pub rows: u64,
    pub columns: Vec<ColumnStatus>,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(PRAGMAS)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(&full_schema())?;
        Ok(Self { conn })
    }

    /// Autocommit session.
    pub fn session(&self) -> SqliteSession<'_> {
        SqliteSession { conn: &self.conn }
    }

    /// Runs `f` in one transaction. Commits when `f` returns `Ok`, rolls back
    /// otherwise.
    pub fn atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&SqliteSession<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let out = f(&SqliteSession { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Row counts and watermarks for one interval table.
    pub fn interval_status(&self, interval: Interval) -> Result<IntervalStatus, StoreError> {
        let table = interval.table_name();
        let rows: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;
        let session = self.session();
        let mut columns = Vec::new();
        for column in columns_for(interval) {
            let code = column.code();
            let populated: i64 = self.conn.query_row(
                &format!("SELECT COUNT(\"{code}\") FROM \"{table}\""),
                [],
                |r| r.get(0),
            )?;
            columns.push(ColumnStatus {
                watermark: session.watermark(column)?,
                column: code,
                populated: populated.max(0) as u64,
            });
        }
        Ok(IntervalStatus {
            interval,
            rows: rows.max(0) as u64,
            columns,
        })
    }

    pub fn event_count(&self, symbol: &str) -> Result<u64, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM asset_events WHERE asset_symbol = ?1",
            [checked_symbol(symbol)?],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}

/// Connection handle the store traits are implemented on.
pub struct SqliteSession<'c> {
    conn: &'c Connection,
}

impl SqliteSession<'_> {
    /// Column identifier checked against the static support table.
    fn column_sql(column: SeriesColumn) -> Result<(String, String), StoreError> {
        let code = column.code();
        if !columns_for(column.interval).contains(&column) {
            return Err(StoreError::UnsupportedColumn {
                column: code,
                interval: column.interval,
            });
        }
        Ok((column.interval.table_name(), code))
    }

    fn read_cell(row: &Row<'_>, idx: usize, value_type: ValueType) -> rusqlite::Result<Option<CellValue>> {
        Ok(match value_type {
            ValueType::Integer => row.get::<_, Option<i64>>(idx)?.map(CellValue::Integer),
            ValueType::Float => row.get::<_, Option<f64>>(idx)?.map(CellValue::Float),
        })
    }

    fn corrupt_date(table: &str, raw: &str) -> StoreError {
        StoreError::Corrupt {
            table: table.to_string(),
            reason: format!("unparseable date '{raw}'"),
        }
    }
}

impl SeriesStore for SqliteSession<'_> {
    fn watermark(&self, column: SeriesColumn) -> Result<Option<NaiveDate>, StoreError> {
        let (table, code) = Self::column_sql(column)?;
        let max: Option<String> = self.conn.query_row(
            &format!("SELECT MAX(date) FROM \"{table}\" WHERE \"{code}\" IS NOT NULL"),
            [],
            |r| r.get(0),
        )?;
        match max {
            None => Ok(None),
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| Self::corrupt_date(&table, &raw)),
        }
    }

    fn existing_rows(&self, interval: Interval, dates: &[NaiveDate]) -> Result<HashMap<NaiveDate, i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT row_id FROM \"{}\" WHERE date = ?1", interval.table_name()))?;
        let mut found = HashMap::new();
        for date in dates {
            let row_id: Option<i64> = stmt.query_row([date_text(*date)], |r| r.get(0)).optional()?;
            if let Some(row_id) = row_id {
                found.insert(*date, row_id);
            }
        }
        Ok(found)
    }

    fn max_row_id(&self, interval: Interval) -> Result<i64, StoreError> {
        let max = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(row_id), 0) FROM \"{}\"", interval.table_name()),
            [],
            |r| r.get(0),
        )?;
        Ok(max)
    }

    fn insert_rows(&self, column: SeriesColumn, rows: &[SeriesRow]) -> Result<usize, StoreError> {
        let (table, code) = Self::column_sql(column)?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("INSERT INTO \"{table}\" (row_id, date, \"{code}\") VALUES (?1, ?2, ?3)"))?;
        for row in rows {
            stmt.execute(params![row.row_id, date_text(row.date), row.value])?;
        }
        debug!(%table, column = %code, rows = rows.len(), "bulk insert");
        Ok(rows.len())
    }

    fn update_cells(&self, column: SeriesColumn, cells: &[(i64, CellValue)]) -> Result<usize, StoreError> {
        let (table, code) = Self::column_sql(column)?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("UPDATE \"{table}\" SET \"{code}\" = ?1 WHERE row_id = ?2"))?;
        let mut changed = 0;
        for (row_id, value) in cells {
            changed += stmt.execute(params![value, row_id])?;
        }
        Ok(changed)
    }

    fn column_cells(&self, column: SeriesColumn) -> Result<Vec<SeriesCell>, StoreError> {
        let (table, code) = Self::column_sql(column)?;
        let value_type = column.value_type();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT date, \"{code}\" FROM \"{table}\" ORDER BY date"))?;
        let raw = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, Self::read_cell(r, 1, value_type)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(date, value)| {
                let date = parse_date(&date).ok_or_else(|| Self::corrupt_date(&table, &date))?;
                Ok(SeriesCell { date, value })
            })
            .collect()
    }

    fn fill_nulls(&self, column: SeriesColumn, fills: &[(NaiveDate, CellValue)]) -> Result<usize, StoreError> {
        let (table, code) = Self::column_sql(column)?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE \"{table}\" SET \"{code}\" = ?1 WHERE date = ?2 AND \"{code}\" IS NULL"
        ))?;
        let mut changed = 0;
        for (date, value) in fills {
            changed += stmt.execute(params![value, date_text(*date)])?;
        }
        Ok(changed)
    }
}

impl EventStore for SqliteSession<'_> {
    fn load_events(&self, symbol: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let symbol = checked_symbol(symbol)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT event_pk, kind_code, announcement_date, start_date, detail
             FROM asset_events WHERE asset_symbol = ?1 ORDER BY event_pk",
        )?;
        let rows = stmt.query_map([symbol], |r| {
            let ann: Option<String> = r.get(2)?;
            let start: Option<String> = r.get(3)?;
            let detail: String = r.get(4)?;
            Ok(StoredEvent {
                pk: r.get(0)?,
                kind_code: r.get(1)?,
                announcement_date: ann.as_deref().and_then(parse_date),
                start_date: start.as_deref().and_then(parse_date),
                // Free-text details written by older loaders stay as strings.
                detail: serde_json::from_str(&detail).unwrap_or(Value::String(detail)),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_events(&self, symbol: &str, pks: &[i64]) -> Result<usize, StoreError> {
        let symbol = checked_symbol(symbol)?;
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM asset_events WHERE asset_symbol = ?1 AND event_pk = ?2")?;
        let mut changed = 0;
        for pk in pks {
            changed += stmt.execute(params![symbol, pk])?;
        }
        Ok(changed)
    }

    fn update_detail(&self, symbol: &str, pk: i64, detail: &Value) -> Result<usize, StoreError> {
        let symbol = checked_symbol(symbol)?;
        let changed = self.conn.execute(
            "UPDATE asset_events SET detail = ?1, modified_at = ?2 WHERE asset_symbol = ?3 AND event_pk = ?4",
            params![detail.to_string(), now_text(), symbol, pk],
        )?;
        Ok(changed)
    }

    fn insert_events(&self, symbol: &str, events: &[Event]) -> Result<usize, StoreError> {
        let symbol = checked_symbol(symbol)?;
        if events.is_empty() {
            return Ok(0);
        }
        let (next_pk, next_id): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(MAX(event_pk), 0) + 1, COALESCE(MAX(event_id), 0) + 1
             FROM asset_events WHERE asset_symbol = ?1",
            [symbol],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let now = now_text();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO asset_events (
                asset_symbol, event_pk, event_id, event_uid, kind_code,
                announcement_date, start_date, created_at, modified_at, activity_status, detail
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10)",
        )?;
        for (offset, event) in (0i64..).zip(events) {
            stmt.execute(params![
                symbol,
                next_pk + offset,
                next_id + offset,
                event_uid(symbol, event),
                event.kind.code(),
                event.announcement_date.map(date_text),
                event.start_date.map(date_text),
                now,
                i64::from(event.active),
                stored_detail(event).to_string(),
            ])?;
        }
        debug!(symbol, rows = events.len(), first_pk = next_pk, "bulk insert events");
        Ok(events.len())
    }
}

impl AssetCatalog for SqliteSession<'_> {
    fn provisioned_assets(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT symbol FROM provisioned_assets ORDER BY symbol")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn provision(&self, symbol: &str) -> Result<bool, StoreError> {
        let symbol = checked_symbol(symbol)?;
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO provisioned_assets (symbol, provisioned_at) VALUES (?1, ?2)",
            params![symbol, now_text()],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EarningsDetail, EstimateMarker, EventDetail, EventKind, Indicator};
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rate_column() -> SeriesColumn {
        SeriesColumn::new(Indicator::FederalFundsRate, Interval::Monthly).unwrap()
    }

    #[test]
    fn watermark_ignores_null_cells() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.session();
        let cpi = SeriesColumn::new(Indicator::Cpi, Interval::Monthly).unwrap();
        s.insert_rows(
            rate_column(),
            &[
                SeriesRow { row_id: 1, date: d(2024, 1, 1), value: CellValue::Float(5.33) },
                SeriesRow { row_id: 2, date: d(2024, 2, 1), value: CellValue::Float(5.33) },
            ],
        )
        .unwrap();
        assert_eq!(s.watermark(rate_column()).unwrap(), Some(d(2024, 2, 1)));
        assert_eq!(s.watermark(cpi).unwrap(), None);

        s.update_cells(cpi, &[(1, CellValue::Float(308.4))]).unwrap();
        assert_eq!(s.watermark(cpi).unwrap(), Some(d(2024, 1, 1)));
        assert_eq!(s.max_row_id(Interval::Monthly).unwrap(), 2);
        let found = s.existing_rows(Interval::Monthly, &[d(2024, 2, 1), d(2024, 3, 1)]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&d(2024, 2, 1)], 2);
    }

    #[test]
    fn unsupported_column_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bogus = SeriesColumn { indicator: Indicator::Inflation, interval: Interval::Daily };
        assert!(matches!(
            store.session().watermark(bogus),
            Err(StoreError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn fill_nulls_leaves_populated_cells() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.session();
        let cpi = SeriesColumn::new(Indicator::Cpi, Interval::Monthly).unwrap();
        s.insert_rows(
            rate_column(),
            &[
                SeriesRow { row_id: 1, date: d(2024, 1, 1), value: CellValue::Float(5.0) },
                SeriesRow { row_id: 2, date: d(2024, 2, 1), value: CellValue::Float(5.0) },
            ],
        )
        .unwrap();
        s.update_cells(cpi, &[(1, CellValue::Float(300.0))]).unwrap();
        let changed = s
            .fill_nulls(cpi, &[(d(2024, 1, 1), CellValue::Float(1.0)), (d(2024, 2, 1), CellValue::Float(300.0))])
            .unwrap();
        assert_eq!(changed, 1);
        let cells = s.column_cells(cpi).unwrap();
        assert_eq!(cells[0].value, Some(CellValue::Float(300.0)));
        assert_eq!(cells[1].value, Some(CellValue::Float(300.0)));
    }

    #[test]
    fn atomic_rolls_back_on_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.atomic(|s| {
            s.provision("AAPL")?;
            Err(StoreError::UnsafeSymbol("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.session().provisioned_assets().unwrap().is_empty());

        store.atomic(|s| s.provision("AAPL").map(|_| ())).unwrap();
        assert_eq!(store.session().provisioned_assets().unwrap(), vec!["AAPL"]);
    }

    #[test]
    fn events_round_trip_with_contiguous_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.session();
        assert!(s.provision("IBM").unwrap());
        assert!(!s.provision("IBM").unwrap());

        let expected = Event::new(
            EventKind::Earnings,
            None,
            Some(d(2024, 4, 24)),
            EventDetail::Earnings(EarningsDetail {
                quarter: Some("Q1".into()),
                year: Some(2024),
                estimate: Some(EstimateMarker(None)),
            }),
        );
        let div = Event::new(
            EventKind::Dividend,
            Some(d(2024, 5, 9)),
            Some(d(2024, 6, 10)),
            EventDetail::Dividend { dividend_amount: Some("1.67".into()) },
        );
        assert_eq!(s.insert_events("IBM", &[expected, div]).unwrap(), 2);

        let rows = s.load_events("IBM").unwrap();
        assert_eq!(rows.iter().map(|r| r.pk).collect::<Vec<_>>(), vec![1, 2]);
        assert!(rows[0].is_placeholder());
        assert_eq!(rows[0].announcement_date, None);
        assert_eq!(rows[1].detail, json!({"dividend_amount": "1.67"}));

        s.update_detail("IBM", 1, &json!({"quarter": "Q1", "year": 2024})).unwrap();
        assert!(!s.load_events("IBM").unwrap()[0].is_placeholder());
        assert_eq!(s.delete_events("IBM", &[2, 99]).unwrap(), 1);
        assert_eq!(store.event_count("IBM").unwrap(), 1);
    }

    #[test]
    fn event_operations_reject_unsafe_symbols() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.session();
        assert!(matches!(s.load_events("ibm; --"), Err(StoreError::UnsafeSymbol(_))));
        assert!(matches!(s.provision("brk.b"), Err(StoreError::UnsafeSymbol(_))));
    }

    #[test]
    fn event_uid_is_stable_per_symbol() {
        let e = Event::new(EventKind::Rate, Some(d(2024, 1, 1)), Some(d(2024, 1, 1)), EventDetail::Rate {
            fvalue: "5.33".into(),
        });
        assert_eq!(event_uid("AAPL", &e), event_uid("AAPL", &e));
        assert_ne!(event_uid("AAPL", &e), event_uid("MSFT", &e));
        assert_eq!(event_uid("AAPL", &e).len(), 32);
    }

    #[test]
    fn status_reports_watermarks() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .session()
            .insert_rows(rate_column(), &[SeriesRow { row_id: 1, date: d(2024, 3, 1), value: CellValue::Float(5.33) }])
            .unwrap();
        let status = store.interval_status(Interval::Monthly).unwrap();
        assert_eq!(status.rows, 1);
        let rate = status.columns.iter().find(|c| c.column == "MEFFRP_value").unwrap();
        assert_eq!(rate.watermark, Some(d(2024, 3, 1)));
        assert_eq!(rate.populated, 1);
    }
}
