//! macroledger runner: drives an ETL run against a store.
//!
//! This crate builds on `macroledger-core` to provide:
//! - Run configuration from TOML and the environment
//! - Incremental indicator ingestion and gap filling
//! - Transactional application of event reconciliation plans
//! - Bounded connection retry with an injectable clock
//! - The orchestrator that sequences a full run and reports the result

pub mod backoff;
pub mod config;
pub mod gap_fill;
pub mod ingest;
pub mod loader;
pub mod orchestrator;
pub mod reference;

pub use backoff::{BackoffPolicy, Clock, FakeClock, RetryExhausted, SystemClock};
pub use config::{ConfigError, EtlConfig, IngestConfig, RetryConfig, StoreConfig};
pub use gap_fill::{fill_column, plan_fill};
pub use ingest::{ingest_column, prepare_values, IngestOutcome};
pub use loader::{apply_plan, LoadOutcome};
pub use orchestrator::{Connector, EtlError, EtlResult, Orchestrator, RunReport, SqliteConnector};
pub use reference::{eligible_assets, ReferenceList};
