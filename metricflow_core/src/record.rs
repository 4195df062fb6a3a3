use crate::values::NamedValues;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Millisecond time window. Resampling treats it as `[from, to)`; store
/// reads treat both ends as inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeframe {
    pub from_timestamp: i64,
    pub to_timestamp: i64,
}

impl Timeframe {
    pub fn new(from_timestamp: i64, to_timestamp: i64) -> Self {
        Self {
            from_timestamp,
            to_timestamp,
        }
    }

    pub fn length(&self) -> i64 {
        self.to_timestamp - self.from_timestamp
    }

    pub fn midpoint(&self) -> i64 {
        (self.from_timestamp + self.to_timestamp) / 2
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from_timestamp && timestamp < self.to_timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedRecord {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "v", default)]
    pub value: NamedValues,
    #[serde(rename = "a", default)]
    pub absolute: NamedValues,
}

impl TimedRecord {
    pub fn new(timestamp: i64, value: NamedValues, absolute: NamedValues) -> Self {
        Self {
            timestamp,
            value,
            absolute,
        }
    }

    pub fn with_value(&self, value: NamedValues) -> Self {
        Self {
            timestamp: self.timestamp,
            value,
            absolute: self.absolute.clone(),
        }
    }
}

impl fmt::Display for TimedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimedRecord <t={}, v={}, a={}>",
            self.timestamp, self.value, self.absolute
        )
    }
}
