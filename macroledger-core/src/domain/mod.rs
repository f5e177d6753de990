//! Domain types: intervals, indicator support table, series cells, events.

pub mod event;
pub mod indicator;
pub mod interval;
pub mod series;

pub use event::{
    sort_for_reconciliation, EarningsDetail, EstimateMarker, Event, EventDetail,
    EventIdentityKey, EventKind, QuarterYear, StoredEvent,
};
pub use indicator::{columns_for, DateRule, Indicator, SeriesColumn, ValueType};
pub use interval::Interval;
pub use series::{CellValue, RawEntry, SeriesCell, SeriesRow};
