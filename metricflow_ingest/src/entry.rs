//! Per-metric streaming aggregation.
//!
//! An [`Entry`] condenses raw updates for one metric name into periodic
//! [`Datapoint`]s. Its behaviour is fixed by the [`MetricKind`] of the first
//! update seen for that name.

use chrono::{DateTime, Utc};
use metricflow_core::{
    round5, Datapoint, DatapointValue, MetricKind, MetricsError, RawUpdate, Result, UpdateValue,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_SAMPLE_SIZE: usize = 1000;
pub const DEFAULT_BUFFER_SIZE: usize = 100;
pub const OTHERS: &str = "others";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStats {
    pub num_updates: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub num_datapoints: u64,
    pub last_datapoint: Option<DateTime<Utc>>,
    pub last_datapoint_num_updates: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub metric_name: String,
    #[serde(flatten)]
    pub stats: EntryStats,
}

#[derive(Debug, Clone)]
enum EntryState {
    Gauge {
        value: Option<f64>,
        num_samples: usize,
    },
    Rate {
        sum: f64,
        num_samples: usize,
        from_timestamp: i64,
    },
    Partitioning {
        buffer_size: usize,
        tracked: HashSet<String>,
        counts: BTreeMap<String, u64>,
        num_samples: usize,
    },
    Percentile {
        bottom: bool,
        buffer: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct Entry {
    metric_name: String,
    kind: MetricKind,
    sample_size: usize,
    state: EntryState,
    stats: EntryStats,
}

impl Entry {
    pub fn new(
        metric_name: impl Into<String>,
        kind: MetricKind,
        sample_size: Option<usize>,
        buffer_size: Option<usize>,
    ) -> Self {
        let sample_size = sample_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SAMPLE_SIZE);

        let state = match kind {
            MetricKind::Gauge => EntryState::Gauge {
                value: None,
                num_samples: 0,
            },
            MetricKind::Rate => EntryState::Rate {
                sum: 0.0,
                num_samples: 0,
                from_timestamp: 0,
            },
            MetricKind::Partitioning => EntryState::Partitioning {
                buffer_size: buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
                tracked: HashSet::new(),
                counts: BTreeMap::new(),
                num_samples: 0,
            },
            MetricKind::Percentile | MetricKind::PercentileBottom => EntryState::Percentile {
                bottom: kind == MetricKind::PercentileBottom,
                buffer: Vec::new(),
            },
        };

        Self {
            metric_name: metric_name.into(),
            kind,
            sample_size,
            state,
            stats: EntryStats::default(),
        }
    }

    pub fn from_update(update: &RawUpdate) -> Self {
        Self::new(
            update.metric_name.clone(),
            update.kind,
            update.sample_size,
            update.buffer_size,
        )
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn stats(&self) -> &EntryStats {
        &self.stats
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            kind: self.kind,
            metric_name: self.metric_name.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn update(
        &mut self,
        value: &UpdateValue,
        timestamp: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Datapoint>> {
        self.stats.num_updates += 1;
        self.stats.last_update = Some(now);

        let datapoint = self.update_state(value, timestamp)?;
        self.record_datapoint(datapoint.as_ref(), now);
        Ok(datapoint)
    }

    pub fn flush(&mut self, timestamp: i64, now: DateTime<Utc>) -> Option<Datapoint> {
        let datapoint = self.generate(timestamp);
        self.record_datapoint(datapoint.as_ref(), now);
        datapoint
    }

    fn record_datapoint(&mut self, datapoint: Option<&Datapoint>, now: DateTime<Utc>) {
        if datapoint.is_none() {
            return;
        }
        self.stats.num_datapoints += 1;
        self.stats.last_datapoint = Some(now);
        self.stats.last_datapoint_num_updates = self.stats.num_updates;
    }

    fn numeric(&self, value: &UpdateValue) -> Result<f64> {
        match value {
            UpdateValue::Number(n) => Ok(*n),
            UpdateValue::Text(s) => Err(MetricsError::validation(format!(
                "a {} value (metric name: \"{}\") must be numeric, got \"{}\"",
                self.kind, self.metric_name, s
            ))),
        }
    }

    fn categorical(&self, value: &UpdateValue) -> Result<String> {
        match value {
            UpdateValue::Text(s) if !s.is_empty() => Ok(s.clone()),
            UpdateValue::Text(_) => Err(MetricsError::validation(format!(
                "a PARTITIONING value (metric name: \"{}\") cannot be falsy",
                self.metric_name
            ))),
            UpdateValue::Number(n) => Err(MetricsError::validation(format!(
                "a PARTITIONING value (metric name: \"{}\") must be a string, got {}",
                self.metric_name, n
            ))),
        }
    }

    fn update_state(&mut self, value: &UpdateValue, timestamp: i64) -> Result<Option<Datapoint>> {
        let sample_size = self.sample_size;

        let ready = match self.kind {
            MetricKind::Partitioning => {
                let category = self.categorical(value)?;
                let EntryState::Partitioning {
                    buffer_size,
                    tracked,
                    counts,
                    num_samples,
                } = &mut self.state
                else {
                    return Ok(None);
                };

                let category = if tracked.contains(&category) {
                    category
                } else {
                    let category = if tracked.len() >= *buffer_size {
                        OTHERS.to_string()
                    } else {
                        category
                    };
                    tracked.insert(category.clone());
                    category
                };

                *counts.entry(category).or_insert(0) += 1;
                *num_samples += 1;
                *num_samples >= sample_size
            }
            _ => {
                let n = self.numeric(value)?;
                match &mut self.state {
                    EntryState::Gauge { value, num_samples } => {
                        *value = Some(n);
                        *num_samples += 1;
                        *num_samples % sample_size == 0
                    }
                    EntryState::Rate {
                        sum,
                        num_samples,
                        from_timestamp,
                    } => {
                        if *num_samples == 0 {
                            *from_timestamp = timestamp;
                        }
                        *sum += n;
                        *num_samples += 1;
                        *num_samples >= sample_size
                    }
                    EntryState::Percentile { buffer, .. } => {
                        buffer.push(n);
                        buffer.len() >= sample_size
                    }
                    EntryState::Partitioning { .. } => false,
                }
            }
        };

        if !ready {
            return Ok(None);
        }
        Ok(self.generate(timestamp))
    }

    fn generate(&mut self, timestamp: i64) -> Option<Datapoint> {
        match &mut self.state {
            EntryState::Gauge { value, num_samples } => {
                *num_samples = 0;
                let value = (*value)?;
                Some(Datapoint::new(
                    self.metric_name.clone(),
                    timestamp,
                    DatapointValue::Number(value),
                ))
            }
            EntryState::Rate {
                sum,
                num_samples,
                from_timestamp,
            } => {
                let dt = (timestamp - *from_timestamp) as f64 / 1000.0;
                if dt == 0.0 {
                    return None;
                }
                let datapoint = Datapoint::new(
                    self.metric_name.clone(),
                    timestamp,
                    DatapointValue::Number(round5(*sum / dt)),
                )
                .with_absolute(*sum);
                *num_samples = 0;
                *sum = 0.0;
                Some(datapoint)
            }
            EntryState::Partitioning {
                tracked,
                counts,
                num_samples,
                ..
            } => {
                if *num_samples == 0 {
                    return None;
                }
                let total = *num_samples as f64;
                let distribution: BTreeMap<String, f64> = counts
                    .iter()
                    .map(|(k, count)| (k.clone(), *count as f64 / total))
                    .collect();
                let datapoint = Datapoint::new(
                    self.metric_name.clone(),
                    timestamp,
                    DatapointValue::Vector(distribution),
                )
                .with_absolute(total);

                counts.clear();
                tracked.clear();
                *num_samples = 0;
                Some(datapoint)
            }
            EntryState::Percentile { bottom, buffer } => {
                if buffer.is_empty() {
                    return None;
                }
                let mut sorted = std::mem::take(buffer);
                sorted.sort_by(|a, b| a.total_cmp(b));

                let at = |k: usize| sorted[sorted.len() * k / 100];
                let first = sorted[0];
                let last = sorted[sorted.len() - 1];

                let quantiles: BTreeMap<String, f64> = if *bottom {
                    [
                        ("min", first),
                        ("p1", at(1)),
                        ("p10", at(10)),
                        ("p50", at(50)),
                        ("p90", at(90)),
                    ]
                } else {
                    [
                        ("p10", at(10)),
                        ("p50", at(50)),
                        ("p90", at(90)),
                        ("p99", at(99)),
                        ("max", last),
                    ]
                }
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();

                Some(Datapoint::new(
                    self.metric_name.clone(),
                    timestamp,
                    DatapointValue::Vector(quantiles),
                ))
            }
        }
    }
}
