use crate::kind::MetricKind;
use crate::values::NamedValues;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateValue {
    Number(f64),
    Text(String),
}

impl From<f64> for UpdateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for UpdateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for UpdateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUpdate {
    pub id: String,
    pub metric_name: String,
    pub timestamp: i64,
    #[serde(rename = "type", alias = "kind")]
    pub kind: MetricKind,
    #[serde(default, alias = "value", skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<UpdateValue>,
    /// Multi-value emission; takes precedence over `metric_value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<UpdateValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl RawUpdate {
    pub fn new(
        id: impl Into<String>,
        metric_name: impl Into<String>,
        timestamp: i64,
        kind: MetricKind,
        value: impl Into<UpdateValue>,
    ) -> Self {
        Self {
            id: id.into(),
            metric_name: metric_name.into(),
            timestamp,
            kind,
            metric_value: Some(value.into()),
            values: None,
            sample_size: None,
            buffer_size: None,
            labels: None,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn with_values(mut self, values: Vec<UpdateValue>) -> Self {
        self.metric_value = None;
        self.values = Some(values);
        self
    }

    pub fn fan_out(&self) -> Vec<&UpdateValue> {
        match &self.values {
            Some(values) => values.iter().collect(),
            None => self.metric_value.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    Number(f64),
    Vector(BTreeMap<String, f64>),
}

impl DatapointValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Number(_) => None,
            Self::Vector(map) => Some(map),
        }
    }

    pub fn to_named_values(&self) -> NamedValues {
        match self {
            Self::Number(n) => NamedValues::scalar(*n),
            Self::Vector(map) => NamedValues::Values(map.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    pub metric_name: String,
    pub timestamp: i64,
    pub value: DatapointValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<f64>,
}

impl Datapoint {
    pub fn new(metric_name: impl Into<String>, timestamp: i64, value: DatapointValue) -> Self {
        Self {
            metric_name: metric_name.into(),
            timestamp,
            value,
            absolute: None,
        }
    }

    pub fn with_absolute(mut self, absolute: f64) -> Self {
        self.absolute = Some(absolute);
        self
    }

    pub fn to_row(&self) -> StoredRow {
        StoredRow {
            metric_name: self.metric_name.clone(),
            timestamp: self.timestamp,
            value: Some(self.value.clone()),
            absolute: self.absolute.map(DatapointValue::Number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(rename = "n")]
    pub metric_name: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<DatapointValue>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<DatapointValue>,
}

impl StoredRow {
    pub fn new(metric_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            metric_name: metric_name.into(),
            timestamp,
            value: None,
            absolute: None,
        }
    }

    pub fn with_value(mut self, value: DatapointValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_absolute(mut self, absolute: DatapointValue) -> Self {
        self.absolute = Some(absolute);
        self
    }
}
