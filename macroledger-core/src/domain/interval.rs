use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling interval of an economic indicator series.
///
/// Each interval owns one series table in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Interval {
    /// Processing order for a full run.
    pub const ALL: [Interval; 6] = [
        Interval::Daily,
        Interval::Weekly,
        Interval::Monthly,
        Interval::Semiannual,
        Interval::Quarterly,
        Interval::Annual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Quarterly => "quarterly",
            Interval::Semiannual => "semiannual",
            Interval::Annual => "annual",
        }
    }

    /// Column-code prefix used when composing indicator column identifiers.
    pub fn column_prefix(self) -> &'static str {
        match self {
            Interval::Daily => "D",
            Interval::Weekly => "W",
            Interval::Monthly => "M",
            Interval::Quarterly => "Q",
            Interval::Semiannual => "SA",
            Interval::Annual => "A",
        }
    }

    /// Name of the series table holding rows for this interval.
    pub fn table_name(self) -> String {
        format!("{}_indicator_log", self.as_str())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown interval '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Weekly".parse::<Interval>().unwrap(), Interval::Weekly);
        assert_eq!(" annual ".parse::<Interval>().unwrap(), Interval::Annual);
        assert!("hourly".parse::<Interval>().is_err());
    }

    #[test]
    fn table_names_follow_interval() {
        assert_eq!(Interval::Semiannual.table_name(), "semiannual_indicator_log");
        assert_eq!(Interval::Semiannual.column_prefix(), "SA");
    }
}
