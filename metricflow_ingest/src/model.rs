//! The worker-resident aggregation state.
//!
//! One [`AggregationModel`] is owned by each ingestion worker. State is not
//! shared or reconciled across workers, so sampling windows are only
//! approximately aligned when several workers consume the same stream.

use crate::entry::{Entry, EntrySummary};
use metricflow_core::{Datapoint, DynClock, MetricKind, RawUpdate, Result, Stopwatch, SystemClock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub metrics: Vec<EntrySummary>,
    pub num_records: u64,
    pub uptime_in_seconds: u64,
}

pub struct AggregationModel {
    entries: BTreeMap<String, Entry>,
    num_records: u64,
    clock: DynClock,
    stopwatch: Stopwatch,
}

impl Default for AggregationModel {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AggregationModel {
    pub fn new(clock: DynClock) -> Self {
        Self {
            entries: BTreeMap::new(),
            num_records: 0,
            stopwatch: Stopwatch::start(clock.clone()),
            clock,
        }
    }

    /// Applies one update, fanning out multi-value updates. Returns every
    /// datapoint the update caused.
    pub fn put(&mut self, update: &RawUpdate) -> Result<Vec<Datapoint>> {
        self.num_records += 1;
        let now = self.clock.now();

        let entry = self
            .entries
            .entry(update.metric_name.clone())
            .or_insert_with(|| {
                debug!(metric = %update.metric_name, kind = %update.kind, "Creating entry");
                Entry::from_update(update)
            });

        let mut datapoints = Vec::new();
        for value in update.fan_out() {
            if let Some(datapoint) = entry.update(value, update.timestamp, now)? {
                debug!(
                    metric = %datapoint.metric_name,
                    timestamp = datapoint.timestamp,
                    "Datapoint emitted"
                );
                datapoints.push(datapoint);
            }
        }

        Ok(datapoints)
    }

    pub fn flush(&mut self, metric_name: &str, timestamp: i64) -> Option<Datapoint> {
        let now = self.clock.now();
        self.entries
            .get_mut(metric_name)
            .and_then(|entry| entry.flush(timestamp, now))
    }

    pub fn entry(&self, metric_name: &str) -> Option<&Entry> {
        self.entries.get(metric_name)
    }

    pub fn names_of_kind(&self, kind: MetricKind) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.kind() == kind)
            .map(|e| e.metric_name().to_string())
            .collect()
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn summarize(&self, names: &[String]) -> ModelSummary {
        let metrics = self
            .entries
            .values()
            .filter(|e| names.is_empty() || names.iter().any(|n| n == e.metric_name()))
            .map(Entry::summary)
            .collect();

        ModelSummary {
            metrics,
            num_records: self.num_records,
            uptime_in_seconds: self.stopwatch.elapsed_seconds(),
        }
    }
}
