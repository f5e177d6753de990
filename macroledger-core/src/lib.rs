//! macroledger core: domain types and the pure parts of the ETL.
//!
//! - Interval and indicator support tables, series and event types
//! - Value normalization for raw upstream scalars
//! - Upstream source traits, response shapes, and the Alpha Vantage client
//! - Event normalization and reconciliation
//! - Storage contract plus the SQLite engine

pub mod context;
pub mod data;
pub mod domain;
pub mod events;
pub mod normalize;
pub mod store;

pub use context::RunContext;

#[cfg(test)]
mod tests {
    use super::*;

    /// Everything handed across the runner boundary must be shareable.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Event>();
        require_sync::<domain::Event>();
        require_send::<domain::StoredEvent>();
        require_sync::<domain::StoredEvent>();
        require_send::<events::ReconciliationPlan>();
        require_sync::<events::ReconciliationPlan>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<RunContext>();
    }
}
