//! Event normalization and reconciliation.

pub mod normalizer;
pub mod reconcile;

pub use normalizer::{normalize_feed, rate_events, NormalizeError};
pub use reconcile::{reconcile, DetailUpdate, ReconciliationPlan};
