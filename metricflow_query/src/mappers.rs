//! Interval mappers: reduce the records of one resampling interval into
//! zero or more output records.
//!
//! Each metric kind has a default mapper; per-metric overrides are looked
//! up by name in a [`MapperRegistry`].

use metricflow_core::{
    round5, MetricKind, MetricsError, NamedValues, Result, TimedRecord, DEFAULT_NAME,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub trait IntervalMapper: Send + Sync {
    fn name(&self) -> &str;

    fn requires_absolute(&self) -> bool {
        true
    }

    /// Reduces the records of the interval `[timestamp - width/2, ...)`.
    /// `timestamp` is where output records without a natural position go.
    fn map(
        &self,
        names: &[String],
        records: &[TimedRecord],
        timestamp: i64,
        width: i64,
    ) -> Result<Vec<TimedRecord>>;
}

pub type DynMapper = Arc<dyn IntervalMapper>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RateMapper;

impl IntervalMapper for RateMapper {
    fn name(&self) -> &str {
        "rate"
    }

    fn map(
        &self,
        names: &[String],
        records: &[TimedRecord],
        timestamp: i64,
        width: i64,
    ) -> Result<Vec<TimedRecord>> {
        let seconds = width as f64 / 1000.0;
        let sums: BTreeMap<String, f64> = names
            .iter()
            .map(|name| {
                let sum = records.iter().map(|r| r.absolute.get_or(name, 0.0)).sum();
                (name.clone(), sum)
            })
            .collect();

        let value =
            NamedValues::from_pairs(sums.iter().map(|(k, v)| (k.clone(), round5(v / seconds))));
        Ok(vec![TimedRecord::new(timestamp, value, NamedValues::Values(sums))])
    }
}

/// Lowest and highest instantaneous rate in the interval, each placed at the
/// record that produced it. The interval total rides on the later of the two
/// so that sigma stays the sum of absolutes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxMapper;

impl IntervalMapper for MinMaxMapper {
    fn name(&self) -> &str {
        "min_max"
    }

    fn map(
        &self,
        names: &[String],
        records: &[TimedRecord],
        _timestamp: i64,
        _width: i64,
    ) -> Result<Vec<TimedRecord>> {
        if records.is_empty() || names.len() != 1 || names[0] != DEFAULT_NAME {
            return Ok(vec![]);
        }

        if records.len() == 1 {
            return Ok(records.to_vec());
        }

        let mut total = records[0].absolute.get(DEFAULT_NAME)?;
        let mut min: Option<(i64, f64)> = None;
        let mut max: Option<(i64, f64)> = None;

        for pair in records.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let amount = curr.absolute.get(DEFAULT_NAME)?;
            total += amount;

            let rate = 1000.0 * amount / (curr.timestamp - prev.timestamp) as f64;
            if rate.is_nan() {
                continue;
            }
            if min.map_or(true, |(_, m)| rate < m) {
                min = Some((curr.timestamp, rate));
            }
            if max.map_or(true, |(_, m)| rate > m) {
                max = Some((curr.timestamp, rate));
            }
        }

        let (Some((min_ts, min)), Some((max_ts, max))) = (min, max) else {
            return Ok(vec![]);
        };

        let low = TimedRecord::new(min_ts, NamedValues::scalar(min), NamedValues::scalar(0.0));
        if min_ts == max_ts {
            return Ok(vec![low]);
        }

        let high = TimedRecord::new(max_ts, NamedValues::scalar(max), NamedValues::scalar(total));
        let mut out = vec![low, high];
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartitioningMapper;

impl IntervalMapper for PartitioningMapper {
    fn name(&self) -> &str {
        "partitioning"
    }

    fn map(
        &self,
        names: &[String],
        records: &[TimedRecord],
        timestamp: i64,
        _width: i64,
    ) -> Result<Vec<TimedRecord>> {
        if records.is_empty() {
            return Ok(vec![]);
        }

        let mut weighted: BTreeMap<String, f64> = names.iter().map(|n| (n.clone(), 0.0)).collect();
        let mut total = 0.0;

        for record in records {
            if record.absolute.len() != 1 {
                return Err(MetricsError::validation(
                    "Found a PARTITIONING record with .a that is not a singleton",
                ));
            }

            let multiplier = record.absolute.get(DEFAULT_NAME)?;
            total += multiplier;
            for (name, sum) in weighted.iter_mut() {
                *sum += record.value.get_or(name, 0.0) * multiplier;
            }
        }

        let value =
            NamedValues::from_pairs(weighted.into_iter().map(|(k, v)| (k, round5(v / total))));
        Ok(vec![TimedRecord::new(timestamp, value, NamedValues::scalar(total))])
    }
}

/// Merges already-computed percentiles: low percentiles and `min` take the
/// minimum, high ones and `max` the maximum, and the median takes the
/// median of the reported medians.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileMapper;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Reduction {
    Min,
    Max,
    Median,
}

impl PercentileMapper {
    fn reduction(name: &str) -> Option<Reduction> {
        match name {
            "min" => Some(Reduction::Min),
            "max" => Some(Reduction::Max),
            _ => {
                // A bare `p` is level 0.
                let level = match name.strip_prefix('p')? {
                    "" => 0.0,
                    digits => digits.parse::<f64>().ok().filter(|n| n.is_finite())?,
                };
                Some(if level < 50.0 {
                    Reduction::Min
                } else if level > 50.0 {
                    Reduction::Max
                } else {
                    Reduction::Median
                })
            }
        }
    }
}

impl IntervalMapper for PercentileMapper {
    fn name(&self) -> &str {
        "percentile"
    }

    fn requires_absolute(&self) -> bool {
        false
    }

    fn map(
        &self,
        names: &[String],
        records: &[TimedRecord],
        timestamp: i64,
        _width: i64,
    ) -> Result<Vec<TimedRecord>> {
        if records.is_empty() {
            return Ok(vec![]);
        }

        let reductions: Vec<Option<Reduction>> = names.iter().map(|n| Self::reduction(n)).collect();
        let bad: Vec<&str> = names
            .iter()
            .zip(&reductions)
            .filter(|(_, r)| r.is_none())
            .map(|(n, _)| n.as_str())
            .take(10)
            .collect();
        if !bad.is_empty() {
            return Err(MetricsError::validation(format!(
                "Found bad names: {}",
                bad.join(", ")
            )));
        }

        let mut out = BTreeMap::new();
        for (name, reduction) in names.iter().zip(reductions.into_iter().flatten()) {
            let mut samples: Vec<f64> =
                records.iter().filter_map(|r| r.value.try_get(name)).collect();
            if samples.is_empty() {
                continue;
            }

            let merged = match reduction {
                Reduction::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
                Reduction::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                Reduction::Median => {
                    samples.sort_by(f64::total_cmp);
                    samples[(samples.len() + 1) / 2 - 1]
                }
            };
            out.insert(name.clone(), merged);
        }

        Ok(vec![TimedRecord::new(
            timestamp,
            NamedValues::Values(out),
            NamedValues::Null,
        )])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GaugeMapper;

impl IntervalMapper for GaugeMapper {
    fn name(&self) -> &str {
        "gauge"
    }

    fn requires_absolute(&self) -> bool {
        false
    }

    fn map(
        &self,
        _names: &[String],
        records: &[TimedRecord],
        timestamp: i64,
        _width: i64,
    ) -> Result<Vec<TimedRecord>> {
        let mut chosen: Option<&TimedRecord> = None;
        for record in records {
            let gap = (record.timestamp - timestamp).abs();
            if chosen.map_or(true, |c| gap < (c.timestamp - timestamp).abs()) {
                chosen = Some(record);
            }
        }

        Ok(chosen.into_iter().cloned().collect())
    }
}

pub fn default_mapper(kind: MetricKind) -> DynMapper {
    match kind {
        MetricKind::Rate => Arc::new(MinMaxMapper),
        MetricKind::Partitioning => Arc::new(PartitioningMapper),
        MetricKind::Percentile | MetricKind::PercentileBottom => Arc::new(PercentileMapper),
        MetricKind::Gauge => Arc::new(GaugeMapper),
    }
}

#[derive(Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, DynMapper>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, mapper: DynMapper) {
        self.mappers.insert(name.into(), mapper);
    }

    pub fn get(&self, name: &str) -> Option<&DynMapper> {
        self.mappers.get(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mappers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("rate", Arc::new(RateMapper));
        registry.register("min_max", Arc::new(MinMaxMapper));
        registry.register("partitioning", Arc::new(PartitioningMapper));
        registry.register("percentile", Arc::new(PercentileMapper));
        registry.register("gauge", Arc::new(GaugeMapper));

        registry
    }
}
