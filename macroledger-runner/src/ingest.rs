//! Indicator ingestion: watermark-filtered incremental load of one column.

use chrono::NaiveDate;
use macroledger_core::domain::{CellValue, RawEntry, SeriesColumn, SeriesRow};
use macroledger_core::normalize::{convert_value, is_missing_marker, parse_date};
use macroledger_core::store::{SeriesStore, StoreError};
use macroledger_core::RunContext;
use std::collections::BTreeMap;
use tracing::{debug, info};

const PROGRESS_EVERY: usize = 1_000;

/// Result of loading one (indicator, interval) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Watermark the entries were filtered against.
    pub watermark: Option<NaiveDate>,
}

impl IngestOutcome {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Converts raw entries into the date-keyed values that belong after
/// `watermark`, in chronological order.
///
/// Missing markers are skipped silently. Unparseable dates and values are
/// skipped with one warning per distinct value. The column's date rule is
/// applied before the watermark comparison, so a shifted date that lands on
/// or before the watermark is dropped. When two entries map to the same date
/// the first one wins.
pub fn prepare_values(
    column: SeriesColumn,
    entries: &[RawEntry],
    watermark: Option<NaiveDate>,
    ctx: &mut RunContext,
) -> BTreeMap<NaiveDate, CellValue> {
    let code = column.code();
    let rule = column.date_rule();
    let value_type = column.value_type();
    let mut values = BTreeMap::new();

    for entry in entries {
        if is_missing_marker(&entry.value) {
            continue;
        }
        let Some(date) = parse_date(&entry.date) else {
            ctx.record_warning_once(
                format!("date:{code}:{}", entry.date),
                &format!("{column}: skipping entry with unparseable date '{}'", entry.date),
            );
            continue;
        };
        let date = rule.apply(date);
        if watermark.is_some_and(|w| date <= w) || values.contains_key(&date) {
            continue;
        }
        match convert_value(&entry.value, value_type) {
            Ok(value) => {
                values.insert(date, value);
            }
            Err(e) => {
                ctx.record_warning_once(format!("convert:{code}:{}", entry.value), &format!("{code}: {e}"));
            }
        }
    }
    values
}

/// Loads `entries` into `column`.
///
/// The watermark is the latest non-null date of the column, or `floor` when
/// the column is empty. Dates that already have a row are updated in place;
/// the rest become new rows numbered after the table's current maximum.
pub fn ingest_column<S: SeriesStore>(
    store: &S,
    column: SeriesColumn,
    entries: &[RawEntry],
    floor: NaiveDate,
    ctx: &mut RunContext,
) -> Result<IngestOutcome, StoreError> {
    let stored = store.watermark(column)?;
    let watermark = stored.unwrap_or(floor);
    let values = prepare_values(column, entries, Some(watermark), ctx);
    debug!(
        %column,
        %watermark,
        fetched = entries.len(),
        fresh = values.len(),
        "filtered against watermark"
    );
    if values.is_empty() {
        return Ok(IngestOutcome {
            watermark: Some(watermark),
            ..IngestOutcome::default()
        });
    }

    let dates: Vec<NaiveDate> = values.keys().copied().collect();
    let existing = store.existing_rows(column.interval, &dates)?;
    let mut next_id = store.max_row_id(column.interval)? + 1;

    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    for (processed, (date, value)) in values.into_iter().enumerate() {
        match existing.get(&date) {
            Some(&row_id) => updates.push((row_id, value)),
            None => {
                inserts.push(SeriesRow {
                    row_id: next_id,
                    date,
                    value,
                });
                next_id += 1;
            }
        }
        if (processed + 1) % PROGRESS_EVERY == 0 {
            info!(%column, processed = processed + 1, total = dates.len(), "preparing rows");
        }
    }

    let updated = if updates.is_empty() {
        0
    } else {
        store.update_cells(column, &updates)?
    };
    let inserted = if inserts.is_empty() {
        0
    } else {
        store.insert_rows(column, &inserts)?
    };
    info!(%column, inserted, updated, "column loaded");

    Ok(IngestOutcome {
        inserted,
        updated,
        watermark: Some(watermark),
    })
}
