use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    /// Top percentiles (p10, p50, p90, p99, max) of a sample
    Percentile,
    /// Per-second rate of an accumulated sum
    Rate,
    /// Last observed value
    Gauge,
    /// Bottom percentiles (min, p1, p10, p50, p90) of a sample
    PercentileBottom,
    /// Categorical distribution
    Partitioning,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Percentile,
        MetricKind::Rate,
        MetricKind::Gauge,
        MetricKind::PercentileBottom,
        MetricKind::Partitioning,
    ];

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Percentile),
            2 => Some(Self::Rate),
            3 => Some(Self::Gauge),
            4 => Some(Self::PercentileBottom),
            5 => Some(Self::Partitioning),
            _ => None,
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Self::Percentile => 1,
            Self::Rate => 2,
            Self::Gauge => 3,
            Self::PercentileBottom => 4,
            Self::Partitioning => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentile => "PERCENTILE",
            Self::Rate => "RATE",
            Self::Gauge => "GAUGE",
            Self::PercentileBottom => "PERCENTILE_BOTTOM",
            Self::Partitioning => "PARTITIONING",
        }
    }

    pub fn is_percentile(&self) -> bool {
        matches!(self, Self::Percentile | Self::PercentileBottom)
    }

    pub fn reports_sigma(&self) -> bool {
        !matches!(
            self,
            Self::Percentile | Self::PercentileBottom | Self::Gauge
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| format!("Unrecognized type ({})", s))
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => MetricKind::from_code(code)
                .ok_or_else(|| de::Error::custom(format!("Unrecognized type ({})", code))),
            Repr::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accepts_names_and_codes() {
        let by_name: MetricKind = serde_json::from_str("\"PERCENTILE_BOTTOM\"").unwrap();
        assert_eq!(by_name, MetricKind::PercentileBottom);

        let by_code: MetricKind = serde_json::from_str("5").unwrap();
        assert_eq!(by_code, MetricKind::Partitioning);

        assert!(serde_json::from_str::<MetricKind>("9").is_err());
        assert!(serde_json::from_str::<MetricKind>("\"HISTOGRAM\"").is_err());
    }

    #[test]
    fn test_kind_serializes_as_name() {
        assert_eq!(serde_json::to_string(&MetricKind::Rate).unwrap(), "\"RATE\"");
        assert_eq!(MetricKind::Gauge.to_string(), "GAUGE");
    }

    #[test]
    fn test_sigma_reporting() {
        assert!(MetricKind::Rate.reports_sigma());
        assert!(MetricKind::Partitioning.reports_sigma());
        assert!(!MetricKind::Gauge.reports_sigma());
        assert!(!MetricKind::Percentile.reports_sigma());
    }
}
