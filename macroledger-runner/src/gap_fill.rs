//! Gap filling for indicator columns.
//!
//! Null cells before the first known value take that first value; null
//! cells after it take the most recent known value. Only cells that were
//! null are written.

use chrono::NaiveDate;
use macroledger_core::domain::{CellValue, SeriesCell, SeriesColumn};
use macroledger_core::store::{SeriesStore, StoreError};
use tracing::debug;

/// Fills needed for `cells`, which must be ordered by date. Empty when the
/// column has no values at all.
pub fn plan_fill(cells: &[SeriesCell]) -> Vec<(NaiveDate, CellValue)> {
    let Some(mut last_seen) = cells.iter().find_map(|c| c.value) else {
        return Vec::new();
    };
    let mut fills = Vec::new();
    for cell in cells {
        match cell.value {
            Some(value) => last_seen = value,
            None => fills.push((cell.date, last_seen)),
        }
    }
    fills
}

/// Gap-fills one column. Returns the number of cells written.
pub fn fill_column<S: SeriesStore>(store: &S, column: SeriesColumn) -> Result<usize, StoreError> {
    let cells = store.column_cells(column)?;
    let fills = plan_fill(&cells);
    if fills.is_empty() {
        return Ok(0);
    }
    let written = store.fill_nulls(column, &fills)?;
    debug!(%column, written, "gap filled");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use macroledger_core::domain::{Indicator, Interval, RawEntry};
    use macroledger_core::store::SqliteStore;
    use macroledger_core::RunContext;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn cell(day: u32, value: Option<f64>) -> SeriesCell {
        SeriesCell {
            date: d(day),
            value: value.map(CellValue::Float),
        }
    }

    #[test]
    fn leading_nulls_take_first_value_and_gaps_carry_forward() {
        let cells = vec![
            cell(1, None),
            cell(2, Some(1.5)),
            cell(3, None),
            cell(4, Some(2.5)),
            cell(5, None),
        ];
        let fills = plan_fill(&cells);
        assert_eq!(
            fills,
            vec![
                (d(1), CellValue::Float(1.5)),
                (d(3), CellValue::Float(1.5)),
                (d(5), CellValue::Float(2.5)),
            ]
        );
    }

    #[test]
    fn all_null_column_is_untouched() {
        assert!(plan_fill(&[cell(1, None), cell(2, None)]).is_empty());
        assert!(plan_fill(&[]).is_empty());
    }

    #[test]
    fn fills_rows_created_by_another_column() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.session();
        let mut ctx = RunContext::new();
        let floor = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let cpi = SeriesColumn::new(Indicator::Cpi, Interval::Monthly).unwrap();
        let sales = SeriesColumn::new(Indicator::RetailSales, Interval::Monthly).unwrap();

        crate::ingest::ingest_column(
            &session,
            sales,
            &[
                RawEntry::new("2024-01-01", "700000"),
                RawEntry::new("2024-02-01", "701000"),
                RawEntry::new("2024-03-01", "702000"),
            ],
            floor,
            &mut ctx,
        )
        .unwrap();
        crate::ingest::ingest_column(&session, cpi, &[RawEntry::new("2024-02-01", "310.3")], floor, &mut ctx).unwrap();

        assert_eq!(fill_column(&session, cpi).unwrap(), 2);
        let cells = session.column_cells(cpi).unwrap();
        assert!(cells.iter().all(|c| c.value == Some(CellValue::Float(310.3))));
        assert_eq!(fill_column(&session, cpi).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn no_nulls_remain_after_fill(values in proptest::collection::vec(proptest::option::of(-1e6f64..1e6), 0..40)) {
            let cells: Vec<SeriesCell> = values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesCell {
                    date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                    value: v.map(CellValue::Float),
                })
                .collect();
            let fills = plan_fill(&cells);
            let first = values.iter().position(Option::is_some);

            match first {
                None => prop_assert!(fills.is_empty()),
                Some(first) => {
                    let nulls = values.iter().filter(|v| v.is_none()).count();
                    prop_assert_eq!(fills.len(), nulls);
                    let leading = CellValue::Float(values[first].unwrap());
                    for (date, value) in fills.iter().filter(|(date, _)| *date < cells[first].date) {
                        prop_assert!(cells.iter().any(|c| c.date == *date && c.value.is_none()));
                        prop_assert_eq!(*value, leading);
                    }
                }
            }
        }
    }
}
