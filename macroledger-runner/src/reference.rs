//! Asset reference list: sector-organized symbols eligible for event
//! ingestion, stored in the `[universe]` section of the run configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceList {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Default for ReferenceList {
    fn default() -> Self {
        Self::default_us()
    }
}

impl ReferenceList {
    /// Every symbol across all sectors, uppercased and deduplicated.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.sectors
            .values()
            .flatten()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols().len()
    }

    /// Large-cap US equities by sector.
    pub fn default_us() -> Self {
        let sector = |symbols: &[&str]| symbols.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut sectors = BTreeMap::new();
        sectors.insert(
            "Technology".into(),
            sector(&["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "AVGO", "CRM", "ADBE", "ORCL", "IBM"]),
        );
        sectors.insert("Healthcare".into(), sector(&["JNJ", "UNH", "PFE", "ABBV", "MRK", "LLY", "TMO", "ABT"]));
        sectors.insert("Finance".into(), sector(&["JPM", "BAC", "WFC", "GS", "MS", "BLK", "SCHW", "C", "AXP", "V"]));
        sectors.insert("Energy".into(), sector(&["XOM", "CVX", "COP", "SLB", "EOG", "MPC", "PSX", "VLO"]));
        sectors.insert(
            "Consumer".into(),
            sector(&["WMT", "PG", "KO", "PEP", "COST", "HD", "MCD", "NKE", "SBUX", "TGT"]),
        );
        Self { sectors }
    }
}

/// Assets to process: provisioned in the store AND present in the reference
/// list, optionally narrowed to `filter` (case-insensitive). An empty
/// filter means no narrowing.
pub fn eligible_assets(provisioned: &[String], reference: &ReferenceList, filter: Option<&[String]>) -> Vec<String> {
    let listed = reference.symbols();
    let wanted: Option<BTreeSet<String>> = filter
        .filter(|f| !f.is_empty())
        .map(|f| f.iter().map(|s| s.trim().to_ascii_uppercase()).collect());

    let eligible: BTreeSet<String> = provisioned
        .iter()
        .map(|s| s.to_ascii_uppercase())
        .filter(|s| listed.contains(s))
        .filter(|s| wanted.as_ref().map_or(true, |w| w.contains(s)))
        .collect();
    eligible.into_iter().collect()
}
