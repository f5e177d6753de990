//! Run-scoped bookkeeping shared by every pipeline stage.
//!
//! One `RunContext` lives for exactly one ETL run. It deduplicates warnings
//! and "not published at this interval" reports, and collects the notices and
//! per-asset warnings that end up in the run summary.

use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RunContext {
    warned: HashSet<String>,
    unavailable: HashSet<String>,
    up_to_date: Vec<String>,
    asset_warnings: BTreeMap<String, Vec<String>>,
    assets_without_new_events: Vec<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` the first time `key` is seen in this run.
    /// Returns `true` when the warning was emitted.
    pub fn record_warning_once(&mut self, key: impl Into<String>, message: &str) -> bool {
        if self.warned.insert(key.into()) {
            warn!("{message}");
            true
        } else {
            false
        }
    }

    /// Marks `key` as having no data available. Returns `true` on first report.
    pub fn record_unavailable_once(&mut self, key: impl Into<String>) -> bool {
        self.unavailable.insert(key.into())
    }

    pub fn record_up_to_date(&mut self, notice: String) {
        info!("already up to date: {notice}");
        self.up_to_date.push(notice);
    }

    pub fn record_asset_warning(&mut self, symbol: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(symbol, "{message}");
        self.asset_warnings
            .entry(symbol.to_string())
            .or_default()
            .push(message);
    }

    pub fn record_no_new_events(&mut self, symbol: &str) {
        self.assets_without_new_events.push(symbol.to_string());
    }

    pub fn up_to_date(&self) -> &[String] {
        &self.up_to_date
    }

    pub fn asset_warnings(&self) -> &BTreeMap<String, Vec<String>> {
        &self.asset_warnings
    }

    pub fn assets_without_new_events(&self) -> &[String] {
        &self.assets_without_new_events
    }

    pub fn unavailable_count(&self) -> usize {
        self.unavailable.len()
    }
}
