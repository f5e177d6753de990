//! Event reconciler.
//!
//! Matches a freshly normalized batch against the events already stored for
//! one asset and produces a [`ReconciliationPlan`]. Planning is pure; the
//! loader applies the plan as delete, update, insert inside one transaction.

use crate::domain::{
    sort_for_reconciliation, Event, EventDetail, EventIdentityKey, QuarterYear, StoredEvent,
};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Detail rewrite for a placeholder promoted in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailUpdate {
    pub pk: i64,
    pub detail: EventDetail,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    /// Obsolete placeholders, ascending.
    pub deletes: Vec<i64>,
    pub updates: Vec<DetailUpdate>,
    /// New events in reconciliation order.
    pub inserts: Vec<Event>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    /// Rows that now carry new information: inserts plus promotions.
    pub fn new_event_count(&self) -> usize {
        self.inserts.len() + self.updates.len()
    }
}

/// Expected-earnings placeholders indexed for matching against actuals
/// whose dates differ from the placeholder's.
#[derive(Debug, Default)]
struct PlaceholderIndex {
    by_quarter: HashMap<QuarterYear, BTreeSet<i64>>,
    by_start: HashMap<NaiveDate, BTreeSet<i64>>,
}

impl PlaceholderIndex {
    fn add(&mut self, row: &StoredEvent) {
        if let Some(qy) = row.quarter_year() {
            self.by_quarter.entry(qy).or_default().insert(row.pk);
        }
        if let Some(start) = row.start_date {
            self.by_start.entry(start).or_default().insert(row.pk);
        }
    }

    fn matching(&self, qy: Option<&QuarterYear>, start: Option<NaiveDate>) -> BTreeSet<i64> {
        let mut found = BTreeSet::new();
        if let Some(pks) = qy.and_then(|qy| self.by_quarter.get(qy)) {
            found.extend(pks);
        }
        if let Some(pks) = start.and_then(|s| self.by_start.get(&s)) {
            found.extend(pks);
        }
        found
    }
}

/// Plans the changes that bring `existing` in line with `incoming`.
///
/// - An exact identity-key match is already present, unless the stored row
///   is a placeholder and the new event is actual: then the row's detail is
///   rewritten in place and any other placeholder for that quarter/year or
///   start date is deleted.
/// - An actual earnings event without an exact match deletes every
///   placeholder sharing its quarter/year or start date, then is inserted.
/// - An expected event for a quarter that already has an actual is dropped,
///   including one planned earlier in the same batch.
/// - Among incoming events sharing a key, the first in reconciliation order wins.
pub fn reconcile(existing: &[StoredEvent], mut incoming: Vec<Event>) -> ReconciliationPlan {
    sort_for_reconciliation(&mut incoming);

    let mut by_key: HashMap<EventIdentityKey, &StoredEvent> = HashMap::with_capacity(existing.len());
    let mut placeholders = PlaceholderIndex::default();
    let mut actual_quarters: HashSet<QuarterYear> = HashSet::new();

    for row in existing {
        by_key.entry(row.identity_key()).or_insert(row);
        if row.is_placeholder() {
            placeholders.add(row);
        } else if row.is_actual_earnings() {
            actual_quarters.extend(row.quarter_year());
        }
    }

    let mut plan = ReconciliationPlan::default();
    let mut deleted: BTreeSet<i64> = BTreeSet::new();
    let mut promoted: HashSet<i64> = HashSet::new();
    let mut seen: HashSet<EventIdentityKey> = HashSet::with_capacity(incoming.len());

    for event in incoming {
        let key = event.identity_key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let is_actual = event.is_actual_earnings();

        if let Some(row) = by_key.get(&key).filter(|row| !deleted.contains(&row.pk)) {
            if is_actual && row.is_placeholder() && promoted.insert(row.pk) {
                let qy = event.quarter_year();
                // Earlier calendar dates for the same quarter leave stale placeholders.
                let stale = placeholders.matching(qy.as_ref(), event.start_date);
                deleted.extend(stale.into_iter().filter(|pk| !promoted.contains(pk)));
                if let Some(qy) = qy {
                    drop_expected_for(&mut plan.inserts, &qy);
                    actual_quarters.insert(qy);
                }
                plan.updates.push(DetailUpdate {
                    pk: row.pk,
                    detail: event.detail,
                });
            }
            continue;
        }

        if is_actual {
            let qy = event.quarter_year();
            let obsolete = placeholders.matching(qy.as_ref(), event.start_date);
            deleted.extend(obsolete.into_iter().filter(|pk| !promoted.contains(pk)));
            if let Some(qy) = qy {
                drop_expected_for(&mut plan.inserts, &qy);
                actual_quarters.insert(qy);
            }
        } else if event.is_expected_earnings()
            && event.quarter_year().is_some_and(|qy| actual_quarters.contains(&qy))
        {
            continue;
        }

        plan.inserts.push(event);
    }

    plan.deletes = deleted.into_iter().collect();
    plan
}

fn drop_expected_for(inserts: &mut Vec<Event>, qy: &QuarterYear) {
    inserts.retain(|e| !(e.is_expected_earnings() && e.quarter_year().as_ref() == Some(qy)));
}
