//! Static support table for economic indicators.
//!
//! Every indicator maps to a column-code suffix, the set of intervals the
//! upstream publishes it at, and the numeric type its cells are stored as.
//! Column identifiers are composed from this table only, never from input.

use super::interval::Interval;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Economic indicator fetched from the upstream series API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    RealGdp,
    RealGdpPerCapita,
    TreasuryYield,
    FederalFundsRate,
    Cpi,
    Inflation,
    RetailSales,
    Durables,
    Unemployment,
    NonfarmPayroll,
}

/// Storage type of an indicator cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Integer,
    Float,
}

/// Per-column rewrite applied to upstream dates before comparison and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    Identity,
    /// Shift back by a fixed number of days. Only the weekly federal funds
    /// column uses this: upstream stamps the week-ending date, the store
    /// keeps the publication-lag corrected date.
    ShiftBack { days: i64 },
}

impl DateRule {
    pub fn apply(self, date: NaiveDate) -> NaiveDate {
        match self {
            DateRule::Identity => date,
            DateRule::ShiftBack { days } => date - Duration::days(days),
        }
    }
}

/// Fully resolved target of one ingestion pass: indicator at one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesColumn {
    pub indicator: Indicator,
    pub interval: Interval,
}

impl SeriesColumn {
    /// Returns `None` when the indicator is not published at `interval`.
    pub fn new(indicator: Indicator, interval: Interval) -> Option<Self> {
        indicator
            .supports(interval)
            .then_some(Self { indicator, interval })
    }

    /// Column code, e.g. `MTNPTP_value` for monthly nonfarm payroll.
    pub fn code(&self) -> String {
        format!("{}{}", self.interval.column_prefix(), self.indicator.column_suffix())
    }

    pub fn value_type(&self) -> ValueType {
        match (self.indicator, self.interval) {
            (Indicator::NonfarmPayroll, _) => ValueType::Integer,
            (Indicator::TreasuryYield, Interval::Daily) => ValueType::Integer,
            _ => ValueType::Float,
        }
    }

    pub fn date_rule(&self) -> DateRule {
        match (self.indicator, self.interval) {
            (Indicator::FederalFundsRate, Interval::Weekly) => DateRule::ShiftBack { days: 5 },
            _ => DateRule::Identity,
        }
    }
}

impl fmt::Display for SeriesColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.indicator, self.interval)
    }
}

impl Indicator {
    pub const ALL: [Indicator; 10] = [
        Indicator::RealGdp,
        Indicator::RealGdpPerCapita,
        Indicator::TreasuryYield,
        Indicator::FederalFundsRate,
        Indicator::Cpi,
        Indicator::Inflation,
        Indicator::RetailSales,
        Indicator::Durables,
        Indicator::Unemployment,
        Indicator::NonfarmPayroll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Indicator::RealGdp => "real_gdp",
            Indicator::RealGdpPerCapita => "real_gdp_per_capita",
            Indicator::TreasuryYield => "treasury_yield",
            Indicator::FederalFundsRate => "federal_funds_rate",
            Indicator::Cpi => "cpi",
            Indicator::Inflation => "inflation",
            Indicator::RetailSales => "retail_sales",
            Indicator::Durables => "durables",
            Indicator::Unemployment => "unemployment",
            Indicator::NonfarmPayroll => "nonfarm_payroll",
        }
    }

    pub fn column_suffix(self) -> &'static str {
        match self {
            Indicator::RealGdp => "RGDPBUSD_value",
            Indicator::RealGdpPerCapita => "RGDPCBUSD_value",
            Indicator::TreasuryYield => "TCMRP_value",
            Indicator::FederalFundsRate => "EFFRP_value",
            Indicator::Cpi => "CPIAUC_value",
            Indicator::Inflation => "ICPP_value",
            Indicator::RetailSales => "ARSRTMUSD_value",
            Indicator::Durables => "MNODGMUSD_value",
            Indicator::Unemployment => "URP_value",
            Indicator::NonfarmPayroll => "TNPTP_value",
        }
    }

    pub fn intervals(self) -> &'static [Interval] {
        match self {
            Indicator::RealGdp => &[Interval::Quarterly, Interval::Annual],
            Indicator::RealGdpPerCapita => &[Interval::Quarterly],
            Indicator::TreasuryYield | Indicator::FederalFundsRate => {
                &[Interval::Daily, Interval::Weekly, Interval::Monthly]
            }
            Indicator::Cpi => &[Interval::Monthly, Interval::Semiannual],
            Indicator::Inflation => &[Interval::Annual],
            Indicator::RetailSales
            | Indicator::Durables
            | Indicator::Unemployment
            | Indicator::NonfarmPayroll => &[Interval::Monthly],
        }
    }

    pub fn supports(self, interval: Interval) -> bool {
        self.intervals().contains(&interval)
    }

    /// Upstream function name.
    pub fn function(self) -> &'static str {
        match self {
            Indicator::RealGdp => "REAL_GDP",
            Indicator::RealGdpPerCapita => "REAL_GDP_PER_CAPITA",
            Indicator::TreasuryYield => "TREASURY_YIELD",
            Indicator::FederalFundsRate => "FEDERAL_FUNDS_RATE",
            Indicator::Cpi => "CPI",
            Indicator::Inflation => "INFLATION",
            Indicator::RetailSales => "RETAIL_SALES",
            Indicator::Durables => "DURABLES",
            Indicator::Unemployment => "UNEMPLOYMENT",
            Indicator::NonfarmPayroll => "NONFARM_PAYROLL",
        }
    }

    /// Whether the upstream function takes an `interval` query parameter.
    /// The others publish a single native interval.
    pub fn accepts_interval(self) -> bool {
        matches!(
            self,
            Indicator::RealGdp | Indicator::TreasuryYield | Indicator::FederalFundsRate | Indicator::Cpi
        )
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All supported (indicator, interval) columns stored in one interval table.
pub fn columns_for(interval: Interval) -> Vec<SeriesColumn> {
    Indicator::ALL
        .into_iter()
        .filter_map(|indicator| SeriesColumn::new(indicator, interval))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_interval_has_no_column() {
        assert!(SeriesColumn::new(Indicator::Inflation, Interval::Daily).is_none());
        assert!(SeriesColumn::new(Indicator::Inflation, Interval::Annual).is_some());
    }

    #[test]
    fn column_codes_compose_prefix_and_suffix() {
        let c = SeriesColumn::new(Indicator::NonfarmPayroll, Interval::Monthly).unwrap();
        assert_eq!(c.code(), "MTNPTP_value");
        assert_eq!(c.value_type(), ValueType::Integer);

        let d = SeriesColumn::new(Indicator::TreasuryYield, Interval::Daily).unwrap();
        assert_eq!(d.code(), "DTCMRP_value");
        assert_eq!(d.value_type(), ValueType::Integer);

        let w = SeriesColumn::new(Indicator::TreasuryYield, Interval::Weekly).unwrap();
        assert_eq!(w.value_type(), ValueType::Float);
    }

    #[test]
    fn only_weekly_federal_funds_is_shifted() {
        let weekly = SeriesColumn::new(Indicator::FederalFundsRate, Interval::Weekly).unwrap();
        assert_eq!(weekly.code(), "WEFFRP_value");
        let d = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        assert_eq!(weekly.date_rule().apply(d), NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());

        for interval in [Interval::Daily, Interval::Monthly] {
            let c = SeriesColumn::new(Indicator::FederalFundsRate, interval).unwrap();
            assert_eq!(c.date_rule(), DateRule::Identity);
        }
        let tw = SeriesColumn::new(Indicator::TreasuryYield, Interval::Weekly).unwrap();
        assert_eq!(tw.date_rule(), DateRule::Identity);
    }

    #[test]
    fn monthly_table_carries_every_monthly_indicator() {
        let cols = columns_for(Interval::Monthly);
        assert_eq!(cols.len(), 7);
        assert!(cols.iter().all(|c| c.interval == Interval::Monthly));
    }
}
