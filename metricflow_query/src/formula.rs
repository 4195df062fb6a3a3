use metricflow_core::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Formula {
    #[default]
    Fraction,
    FractionComplement,
    Parts,
}

impl Formula {
    pub fn resolve(raw: Option<&str>) -> Result<Self> {
        match raw {
            None | Some("") => Ok(Self::Fraction),
            Some(s) => s.parse(),
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Fraction => a / b,
            Self::FractionComplement => 1.0 - a / b,
            Self::Parts => a / (a + b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraction => "FRACTION",
            Self::FractionComplement => "FRACTION_COMPLEMENT",
            Self::Parts => "PARTS",
        }
    }
}

impl FromStr for Formula {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FRACTION" => Ok(Self::Fraction),
            "FRACTION_COMPLEMENT" => Ok(Self::FractionComplement),
            "PARTS" => Ok(Self::Parts),
            _ => Err(MetricsError::validation(format!("Bad formula value ({})", s))),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
