//! Batch loader: applies a reconciliation plan to one asset's events.

use macroledger_core::events::ReconciliationPlan;
use macroledger_core::store::{EventStore, StoreError};
use serde::Serialize;
use tracing::debug;

/// Rows changed by one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadOutcome {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

impl LoadOutcome {
    /// Events that are new to the asset: fresh rows plus promoted placeholders.
    pub fn new_events(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Runs delete, then update, then insert. Callers wrap this in a
/// transaction so the three phases apply together.
pub fn apply_plan<S: EventStore>(store: &S, symbol: &str, plan: &ReconciliationPlan) -> Result<LoadOutcome, StoreError> {
    let deleted = if plan.deletes.is_empty() {
        0
    } else {
        store.delete_events(symbol, &plan.deletes)?
    };

    let mut updated = 0;
    for update in &plan.updates {
        updated += store.update_detail(symbol, update.pk, &update.detail.to_json())?;
    }

    let inserted = store.insert_events(symbol, &plan.inserts)?;
    debug!(symbol, deleted, updated, inserted, "plan applied");
    Ok(LoadOutcome {
        deleted,
        updated,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use macroledger_core::domain::{EarningsDetail, EstimateMarker, Event, EventDetail, EventKind};
    use macroledger_core::events::reconcile;
    use macroledger_core::store::{AssetCatalog, SqliteStore};

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    fn earnings(ann: Option<NaiveDate>, start: Option<NaiveDate>, estimate: Option<EstimateMarker>) -> Event {
        Event::new(
            EventKind::Earnings,
            ann,
            start,
            EventDetail::Earnings(EarningsDetail {
                quarter: Some("Q1".into()),
                year: Some(2024),
                estimate,
            }),
        )
    }

    #[test]
    fn placeholder_replaced_by_actual_with_different_dates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.session().provision("AAPL").unwrap();

        let placeholder = earnings(None, d(2024, 4, 25), Some(EstimateMarker(Some("1.50".into()))));
        let first = store
            .atomic(|s| {
                let plan = reconcile(&s.load_events("AAPL")?, vec![placeholder.clone()]);
                apply_plan(s, "AAPL", &plan)
            })
            .unwrap();
        assert_eq!(first.inserted, 1);

        let actual = earnings(d(2024, 3, 31), d(2024, 5, 2), None);
        let second = store
            .atomic(|s| {
                let plan = reconcile(&s.load_events("AAPL")?, vec![actual.clone()]);
                apply_plan(s, "AAPL", &plan)
            })
            .unwrap();
        assert_eq!((second.deleted, second.updated, second.inserted), (1, 0, 1));

        let rows = store.session().load_events("AAPL").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_actual_earnings());
        assert_eq!(rows[0].announcement_date, d(2024, 3, 31));
    }

    #[test]
    fn exact_match_is_promoted_in_place() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.session().provision("MSFT").unwrap();
        let day = d(2024, 4, 25);
        let placeholder = earnings(day, day, Some(EstimateMarker(None)));
        store
            .atomic(|s| apply_plan(s, "MSFT", &reconcile(&[], vec![placeholder])))
            .unwrap();

        let actual = earnings(day, day, None);
        let outcome = store
            .atomic(|s| {
                let plan = reconcile(&s.load_events("MSFT")?, vec![actual.clone()]);
                apply_plan(s, "MSFT", &plan)
            })
            .unwrap();
        assert_eq!(outcome, LoadOutcome { deleted: 0, updated: 1, inserted: 0 });
        assert_eq!(outcome.new_events(), 1);

        let rows = store.session().load_events("MSFT").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pk, 1);
        assert!(!rows[0].is_placeholder());
    }

    #[test]
    fn promotion_clears_placeholder_from_earlier_calendar_date() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.session().provision("AAPL").unwrap();
        let mut run = |events: Vec<Event>| {
            store
                .atomic(|s| {
                    let plan = reconcile(&s.load_events("AAPL")?, events);
                    apply_plan(s, "AAPL", &plan)
                })
                .unwrap()
        };

        run(vec![earnings(None, d(2024, 4, 25), Some(EstimateMarker(Some("1.50".into()))))]);
        let moved = run(vec![earnings(d(2024, 3, 31), d(2024, 4, 30), Some(EstimateMarker(None)))]);
        assert_eq!(moved.inserted, 1);

        let reported = run(vec![earnings(d(2024, 3, 31), d(2024, 4, 30), None)]);
        assert_eq!(reported, LoadOutcome { deleted: 1, updated: 1, inserted: 0 });

        let rows = store.session().load_events("AAPL").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pk, 2);
        assert!(rows[0].is_actual_earnings());
    }

    #[test]
    fn failed_insert_rolls_back_deletes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.session().provision("IBM").unwrap();
        let placeholder = earnings(None, d(2024, 4, 25), Some(EstimateMarker(None)));
        store
            .atomic(|s| apply_plan(s, "IBM", &reconcile(&[], vec![placeholder])))
            .unwrap();

        let actual = earnings(d(2024, 3, 31), d(2024, 4, 25), None);
        let result = store.atomic(|s| {
            let plan = reconcile(&s.load_events("IBM")?, vec![actual.clone()]);
            assert_eq!(plan.deletes.len(), 1);
            apply_plan(s, "IBM", &plan)?;
            // Simulated failure after all three phases.
            apply_plan(s, "ibm", &plan)
        });
        assert!(matches!(result, Err(StoreError::UnsafeSymbol(_))));

        let rows = store.session().load_events("IBM").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_placeholder());
    }
}
