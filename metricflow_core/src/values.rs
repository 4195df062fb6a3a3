//! Named value vectors: one multi-series observation at one instant.
//!
//! A vector maps series names to numbers. A vector holding a single entry
//! under [`DEFAULT_NAME`] answers lookups for any name, which lets
//! single-series and multi-series data flow through the same code. The
//! [`NamedValues::Null`] sentinel means "no value" and absorbs every
//! combination it takes part in.

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_NAME: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum NamedValues {
    #[default]
    Null,
    Values(BTreeMap<String, f64>),
}

impl NamedValues {
    pub fn scalar(value: f64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_NAME.to_string(), value);
        Self::Values(map)
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::Values(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Numbers become scalars, objects become multi-entry vectors and
    /// JSON null becomes the null vector.
    pub fn parse(raw: &serde_json::Value) -> Result<Self> {
        match raw {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Self::scalar)
                .ok_or_else(|| MetricsError::validation(format!("Unrepresentable number ({})", n))),
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (name, value) in obj {
                    let n = value.as_f64().ok_or_else(|| {
                        MetricsError::validation(format!(
                            "Expected a number under '{}', found {}",
                            name, value
                        ))
                    })?;
                    map.insert(name.clone(), n);
                }
                Ok(Self::Values(map))
            }
            other => Err(MetricsError::validation(format!(
                "Expected a number or an object, found {}",
                other
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Values(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        let map = match self {
            Self::Null => None,
            Self::Values(map) => Some(map),
        };
        map.into_iter().flat_map(|m| m.keys().map(String::as_str))
    }

    fn is_scalar(map: &BTreeMap<String, f64>) -> bool {
        map.len() == 1 && map.contains_key(DEFAULT_NAME)
    }

    pub fn try_get(&self, name: &str) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Values(map) if Self::is_scalar(map) => map.get(DEFAULT_NAME).copied(),
            Self::Values(map) => map.get(name).copied(),
        }
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        self.try_get(name).ok_or_else(|| {
            MetricsError::lookup(format!("No value with the specified name ({})", name))
        })
    }

    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.try_get(name).unwrap_or(default)
    }

    /// Pointwise combination over this vector's names. The other vector
    /// must answer every one of them.
    pub fn combine<F>(&self, other: &NamedValues, mut combiner: F) -> Result<NamedValues>
    where
        F: FnMut(f64, f64) -> f64,
    {
        let map = match (self, other) {
            (Self::Null, _) | (_, Self::Null) => return Ok(Self::Null),
            (Self::Values(map), _) => map,
        };

        let mut out = BTreeMap::new();
        for (name, value) in map {
            out.insert(name.clone(), combiner(*value, other.get(name)?));
        }
        Ok(Self::Values(out))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Values(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let n = serde_json::Number::from_f64(*v)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null);
                        (k.clone(), n)
                    })
                    .collect(),
            ),
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Null => None,
            Self::Values(map) => Some(map),
        }
    }
}

impl fmt::Display for NamedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Values(map) => {
                let data: Vec<String> = map.iter().map(|(k, v)| format!("{}=>{}", k, v)).collect();
                write!(f, "<{}>", data.join(", "))
            }
        }
    }
}

impl Serialize for NamedValues {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Values(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for NamedValues {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Scalar(f64),
            Map(BTreeMap<String, f64>),
        }

        Ok(match Option::<Repr>::deserialize(deserializer)? {
            None => Self::Null,
            Some(Repr::Scalar(v)) => Self::scalar(v),
            Some(Repr::Map(map)) => Self::Values(map),
        })
    }
}

pub fn round5(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * 100_000.0).round() / 100_000.0
}
