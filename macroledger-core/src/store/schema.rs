//! SQLite DDL. Series table columns are generated from the indicator support
//! table; no identifier here ever comes from input.

use crate::domain::{columns_for, Interval, SeriesColumn, ValueType};

pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";

pub const EVENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS provisioned_assets (
    symbol TEXT PRIMARY KEY,
    provisioned_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS asset_events (
    asset_symbol TEXT NOT NULL REFERENCES provisioned_assets(symbol),
    event_pk INTEGER NOT NULL,
    event_id INTEGER NOT NULL,
    event_uid TEXT NOT NULL UNIQUE,
    kind_code INTEGER NOT NULL,
    announcement_date TEXT,
    start_date TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    activity_status INTEGER NOT NULL DEFAULT 1,
    detail TEXT NOT NULL,
    PRIMARY KEY (asset_symbol, event_pk)
);

CREATE INDEX IF NOT EXISTS idx_asset_events_kind
    ON asset_events(asset_symbol, kind_code);
"#;

fn sql_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Integer => "INTEGER",
        ValueType::Float => "REAL",
    }
}

/// `CREATE TABLE` for one interval's indicator log.
pub fn series_table_ddl(interval: Interval) -> String {
    let columns: String = columns_for(interval)
        .iter()
        .map(|c: &SeriesColumn| format!(",\n    \"{}\" {}", c.code(), sql_type(c.value_type())))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\n    row_id INTEGER PRIMARY KEY,\n    date TEXT NOT NULL UNIQUE{columns}\n);\n",
        table = interval.table_name(),
    )
}

/// Full schema: every interval table plus the event tables.
pub fn full_schema() -> String {
    let mut ddl: String = Interval::ALL.iter().map(|i| series_table_ddl(*i)).collect();
    ddl.push_str(EVENT_SCHEMA);
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_table_has_rate_columns() {
        let ddl = series_table_ddl(Interval::Weekly);
        assert!(ddl.contains("\"weekly_indicator_log\""));
        assert!(ddl.contains("\"WTCMRP_value\" REAL"));
        assert!(ddl.contains("\"WEFFRP_value\" REAL"));
        assert!(!ddl.contains("CPIAUC"));
    }

    #[test]
    fn integer_columns_use_integer_affinity() {
        assert!(series_table_ddl(Interval::Monthly).contains("\"MTNPTP_value\" INTEGER"));
        assert!(series_table_ddl(Interval::Daily).contains("\"DTCMRP_value\" INTEGER"));
    }

    #[test]
    fn schema_covers_every_interval() {
        let ddl = full_schema();
        for interval in Interval::ALL {
            assert!(ddl.contains(&interval.table_name()));
        }
        assert!(ddl.contains("asset_events"));
    }
}
