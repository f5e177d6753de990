//! One ETL run: indicators, gap fill, then per-asset events.
//!
//! The orchestrator owns the store connection for the run. Each unit of work
//! (an indicator column, a gap-filled column, one asset's event plan) commits
//! in its own transaction, so a failure in one unit leaves earlier units
//! committed and later ones unaffected.

use crate::backoff::{BackoffPolicy, Clock, SystemClock};
use crate::config::{EtlConfig, IngestConfig};
use crate::gap_fill::fill_column;
use crate::ingest::ingest_column;
use crate::loader::{apply_plan, LoadOutcome};
use crate::reference::{eligible_assets, ReferenceList};
use macroledger_core::data::{EventFeed, EventPayload, EventSource, FetchError, SeriesPayload, SeriesSource};
use macroledger_core::domain::{columns_for, Event, Indicator, Interval, RawEntry, SeriesColumn};
use macroledger_core::events::{normalize_feed, rate_events, reconcile};
use macroledger_core::store::{AssetCatalog, EventStore, SqliteStore, StoreError};
use macroledger_core::RunContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SUCCESS_MESSAGE: &str = "ETL process completed successfully";
pub const CONNECT_FAILED: &str = "Database connection failed";

/// Series the shared rate-change events are built from.
const RATE_SOURCE: (Indicator, Interval) = (Indicator::FederalFundsRate, Interval::Monthly);

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Database connection failed after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Opens the store for a run.
pub trait Connector {
    fn connect(&self) -> Result<SqliteStore, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    pub path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<SqliteStore, StoreError> {
        SqliteStore::open(&self.path)
    }
}

/// Details behind the summary counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub indicators_updated: usize,
    pub gap_cells_filled: usize,
    /// (indicator, interval) pairs the upstream does not publish.
    pub unpublished_columns: usize,
    pub up_to_date: Vec<String>,
    pub assets_processed: Vec<String>,
    pub asset_warnings: BTreeMap<String, Vec<String>>,
    pub assets_without_new_events: Vec<String>,
}

/// Result object returned to the trigger interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtlResult {
    pub success: bool,
    pub error: Option<String>,
    pub message: String,
    pub indicators_inserted: usize,
    pub events_inserted: usize,
    #[serde(skip)]
    pub report: RunReport,
}

impl EtlResult {
    fn failure(error: &EtlError) -> Self {
        let message = match error {
            EtlError::Connect { .. } => CONNECT_FAILED.to_string(),
            EtlError::Store(_) => "ETL process failed".to_string(),
        };
        Self {
            success: false,
            error: Some(error.to_string()),
            message,
            indicators_inserted: 0,
            events_inserted: 0,
            report: RunReport::default(),
        }
    }
}

#[derive(Debug, Default)]
struct IndicatorTotals {
    inserted: usize,
    updated: usize,
    /// Entries of the rate-change series, when it was fetched.
    rate_entries: Option<Vec<RawEntry>>,
}

pub struct Orchestrator<U, C> {
    upstream: U,
    connector: C,
    backoff: BackoffPolicy,
    clock: Box<dyn Clock>,
    reference: ReferenceList,
    ingest: IngestConfig,
}

impl<U, C> Orchestrator<U, C>
where
    U: SeriesSource + EventSource,
    C: Connector,
{
    pub fn new(upstream: U, connector: C, config: &EtlConfig) -> Self {
        Self {
            upstream,
            connector,
            backoff: BackoffPolicy::from(&config.retry),
            clock: Box::new(SystemClock),
            reference: config.universe.clone(),
            ingest: config.ingest.clone(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs the whole ETL. `tickers` narrows event processing; `None` or an
    /// empty list means every eligible asset. Never panics on upstream or
    /// store failures: they surface as `success: false`.
    pub fn run(&self, tickers: Option<&[String]>) -> EtlResult {
        info!("starting ETL run");
        match self.try_run(tickers) {
            Ok(result) => {
                info!(
                    indicators_inserted = result.indicators_inserted,
                    events_inserted = result.events_inserted,
                    "{}",
                    result.message
                );
                result
            }
            Err(e) => {
                warn!("ETL run failed: {e}");
                EtlResult::failure(&e)
            }
        }
    }

    fn try_run(&self, tickers: Option<&[String]>) -> Result<EtlResult, EtlError> {
        let mut store = self.connect()?;
        let mut ctx = RunContext::new();

        let totals = self.ingest_indicators(&mut store, &mut ctx);
        let gap_cells_filled = self.fill_gaps(&mut store);
        if totals.inserted > 0 {
            info!(inserted = totals.inserted, "indicator records inserted");
        } else if !ctx.up_to_date().is_empty() {
            info!("indicator data already available for recent dates");
        }

        let rate_entries = match totals.rate_entries {
            Some(entries) => entries,
            None => self.fetch_rate_entries(&mut ctx),
        };
        let rates = rate_events(&rate_entries, self.ingest.rate_periods);
        let (assets_processed, events_inserted) = self.ingest_events(&mut store, &rates, tickers, &mut ctx)?;

        Ok(EtlResult {
            success: true,
            error: None,
            message: SUCCESS_MESSAGE.to_string(),
            indicators_inserted: totals.inserted,
            events_inserted,
            report: RunReport {
                indicators_updated: totals.updated,
                gap_cells_filled,
                unpublished_columns: ctx.unavailable_count(),
                up_to_date: ctx.up_to_date().to_vec(),
                assets_processed,
                asset_warnings: ctx.asset_warnings().clone(),
                assets_without_new_events: ctx.assets_without_new_events().to_vec(),
            },
        })
    }

    fn connect(&self) -> Result<SqliteStore, EtlError> {
        self.backoff
            .retry(self.clock.as_ref(), "store connection", |attempt| {
                debug!(attempt, "connecting to store");
                self.connector.connect()
            })
            .map_err(|e| EtlError::Connect {
                attempts: e.attempts,
                source: e.last_error,
            })
    }

    fn fetch_entries(&self, column: SeriesColumn) -> Result<Vec<RawEntry>, FetchError> {
        let body = self.upstream.fetch_series(column.indicator, column.interval)?;
        Ok(SeriesPayload::classify(body)?.into_entries())
    }

    /// Loads every supported (indicator, interval) column, interval by
    /// interval. A failed column is skipped with a warning.
    fn ingest_indicators(&self, store: &mut SqliteStore, ctx: &mut RunContext) -> IndicatorTotals {
        let mut totals = IndicatorTotals::default();
        for interval in Interval::ALL {
            for indicator in Indicator::ALL {
                let Some(column) = SeriesColumn::new(indicator, interval) else {
                    if ctx.record_unavailable_once(format!("{indicator}:{interval}")) {
                        debug!(%indicator, %interval, "not published at this interval");
                    }
                    continue;
                };

                let entries = match self.fetch_entries(column) {
                    Ok(entries) => entries,
                    Err(e) => {
                        ctx.record_warning_once(format!("fetch:{}", column.code()), &format!("skipping {column}: {e}"));
                        continue;
                    }
                };

                let floor = self.ingest.history_floor;
                match store.atomic(|s| ingest_column(s, column, &entries, floor, ctx)) {
                    Ok(outcome) if outcome.changed() == 0 => {
                        let till = outcome.watermark.map(|w| w.to_string()).unwrap_or_default();
                        ctx.record_up_to_date(format!("{column} till {till}"));
                    }
                    Ok(outcome) => {
                        totals.inserted += outcome.inserted;
                        totals.updated += outcome.updated;
                    }
                    Err(e) => {
                        ctx.record_warning_once(format!("load:{}", column.code()), &format!("failed to load {column}: {e}"));
                    }
                }

                if (indicator, interval) == RATE_SOURCE {
                    totals.rate_entries = Some(entries);
                }
            }
        }
        totals
    }

    /// Gap-fills every supported column, each in its own transaction.
    fn fill_gaps(&self, store: &mut SqliteStore) -> usize {
        let mut filled = 0;
        for interval in Interval::ALL {
            for column in columns_for(interval) {
                match store.atomic(|s| fill_column(s, column)) {
                    Ok(n) => filled += n,
                    Err(e) => warn!(%column, "gap fill failed: {e}"),
                }
            }
        }
        debug!(filled, "gap fill complete");
        filled
    }

    fn fetch_rate_entries(&self, ctx: &mut RunContext) -> Vec<RawEntry> {
        let (indicator, interval) = RATE_SOURCE;
        let Some(column) = SeriesColumn::new(indicator, interval) else {
            return Vec::new();
        };
        match self.fetch_entries(column) {
            Ok(entries) => entries,
            Err(e) => {
                ctx.record_warning_once("rate-events", &format!("no rate events this run: {e}"));
                Vec::new()
            }
        }
    }

    /// Fetches and normalizes one feed. The error is the per-asset warning.
    fn fetch_feed(&self, symbol: &str, feed: EventFeed) -> Result<Vec<Event>, String> {
        let response = self
            .upstream
            .fetch_events(symbol, feed)
            .map_err(|e| format!("Exception getting {feed}: {e}"))?;
        let body = match response.data {
            Some(body) if response.status == 200 => body,
            _ => return Err(format!("Invalid or failed response for {feed}")),
        };
        let payload = EventPayload::classify(body).map_err(|e| match e {
            FetchError::Upstream(message) => format!("API error for {feed}: {message}"),
            other => format!("Exception getting {feed}: {other}"),
        })?;
        normalize_feed(symbol, feed, payload).map_err(|e| e.to_string())
    }

    /// Reconciles and loads events for every eligible asset. Returns the
    /// assets processed and the number of new events.
    fn ingest_events(
        &self,
        store: &mut SqliteStore,
        rates: &[Event],
        tickers: Option<&[String]>,
        ctx: &mut RunContext,
    ) -> Result<(Vec<String>, usize), EtlError> {
        let provisioned = store.session().provisioned_assets()?;
        let assets = eligible_assets(&provisioned, &self.reference, tickers);
        info!(assets = assets.len(), rate_events = rates.len(), "processing asset events");

        let mut events_inserted = 0;
        for symbol in &assets {
            let mut incoming = Vec::new();
            for feed in EventFeed::ALL {
                match self.fetch_feed(symbol, feed) {
                    Ok(mut events) => incoming.append(&mut events),
                    Err(message) => ctx.record_asset_warning(symbol, message),
                }
            }
            incoming.extend_from_slice(rates);

            let loaded: Result<Option<LoadOutcome>, StoreError> = store.atomic(|s| {
                let plan = reconcile(&s.load_events(symbol)?, incoming);
                if plan.is_empty() {
                    return Ok(None);
                }
                apply_plan(s, symbol, &plan).map(Some)
            });
            match loaded {
                Ok(Some(outcome)) => {
                    info!(symbol = symbol.as_str(), new = outcome.new_events(), deleted = outcome.deleted, "events loaded");
                    events_inserted += outcome.new_events();
                }
                Ok(None) => {
                    info!(symbol = symbol.as_str(), "no new events");
                    ctx.record_no_new_events(symbol);
                }
                Err(e) => ctx.record_asset_warning(symbol, format!("Failed to insert events: {e}")),
            }
        }
        Ok((assets, events_inserted))
    }
}
