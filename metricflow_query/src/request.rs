use metricflow_core::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Absent: single series under the default name. Empty: discover every
    /// name present in the data. Otherwise exactly these names.
    #[serde(default, alias = "polyvalue", skip_serializing_if = "Option::is_none")]
    pub named_series: Option<Vec<String>>,
    #[serde(
        default,
        alias = "datapointIntervalMillis",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval_millis: Option<i64>,
}

impl QueryOptions {
    pub fn named(names: Vec<String>) -> Self {
        Self {
            named_series: Some(names),
            interval_millis: None,
        }
    }

    pub fn with_interval(mut self, millis: i64) -> Self {
        self.interval_millis = Some(millis);
        self
    }

    pub fn interval_width(&self) -> Option<i64> {
        self.interval_millis.filter(|w| *w > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Per {
    pub metric_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub metric_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per: Option<Per>,
}

impl Query {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            identifier: None,
            timeframe: None,
            options: None,
            per: None,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    pub fn per(mut self, metric_name: impl Into<String>, formula: Option<&str>) -> Self {
        self.per = Some(Per {
            metric_name: metric_name.into(),
            formula: formula.map(str::to_string),
            options: None,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub query: Query,
    pub timestamps: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<BTreeMap<String, f64>>,
    pub values: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub output: Vec<QueryOutput>,
}
