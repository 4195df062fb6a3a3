//! Immutable timestamped series and the resampling engine over them.
//!
//! A [`TimedSeries`] is created per query from stored rows, transformed
//! into new series by resampling or combination, and finally rendered into
//! the client output form.

use crate::mappers::IntervalMapper;
use crate::request::QueryOptions;
use metricflow_core::{
    round5, DatapointValue, MetricKind, MetricsError, NamedValues, Result, StoredRow,
    TimedRecord, Timeframe, DEFAULT_NAME,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOutput {
    pub timestamps: Vec<i64>,
    pub sigma: BTreeMap<String, f64>,
    pub values: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct TimedSeries {
    records: Vec<TimedRecord>,
    options: QueryOptions,
    timeframe: Timeframe,
    kind: Option<MetricKind>,
}

impl TimedSeries {
    pub fn new(
        records: Vec<TimedRecord>,
        options: QueryOptions,
        timeframe: Timeframe,
        kind: Option<MetricKind>,
    ) -> Result<Self> {
        if let Some(i) =
            (1..records.len()).find(|&i| records[i].timestamp <= records[i - 1].timestamp)
        {
            return Err(MetricsError::validation(format!(
                "Data was supposed to be sorted by timestamp, but it is not (index={})",
                i
            )));
        }

        Ok(Self {
            records,
            options,
            timeframe,
            kind,
        })
    }

    /// Wraps stored rows. Without named series every value and absolute is
    /// read as a scalar; a missing value becomes NaN and a missing absolute
    /// the null vector.
    pub fn parse(
        rows: &[StoredRow],
        options: QueryOptions,
        timeframe: Timeframe,
        kind: Option<MetricKind>,
    ) -> Result<Self> {
        let named = options.named_series.is_some();
        let records = rows
            .iter()
            .map(|row| {
                let value = match (&row.value, named) {
                    (Some(v), true) => v.to_named_values(),
                    (None, true) => NamedValues::Null,
                    (Some(v), false) => NamedValues::scalar(scalar_of(v, row)?),
                    (None, false) => NamedValues::scalar(f64::NAN),
                };
                let absolute = match (&row.absolute, named) {
                    (Some(a), true) => a.to_named_values(),
                    (Some(a), false) => NamedValues::scalar(scalar_of(a, row)?),
                    (None, _) => NamedValues::Null,
                };
                Ok(TimedRecord::new(row.timestamp, value, absolute))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(records, options, timeframe, kind)
    }

    pub fn records(&self) -> &[TimedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn kind(&self) -> Option<MetricKind> {
        self.kind
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn names(&self) -> Vec<String> {
        match &self.options.named_series {
            None => vec![DEFAULT_NAME.to_string()],
            Some(names) if names.is_empty() => self
                .records
                .iter()
                .flat_map(|r| r.value.names())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Some(names) => names.clone(),
        }
    }

    fn with_records(&self, records: Vec<TimedRecord>) -> Result<Self> {
        Self::new(records, self.options.clone(), self.timeframe, self.kind)
    }

    /// Resamples into fixed-width, half-open intervals aligned to a
    /// multiple of the width. A trailing interval that would end after the
    /// timeframe is dropped. Without an interval width, or when
    /// `require_absolute` is set and some record lacks an absolute vector,
    /// the series is returned unchanged.
    pub fn map_intervals(
        &self,
        mapper: &dyn IntervalMapper,
        require_absolute: bool,
    ) -> Result<TimedSeries> {
        let Some(width) = self.options.interval_width() else {
            return Ok(self.clone());
        };

        if require_absolute && self.records.iter().any(|r| r.absolute.is_null()) {
            debug!(mapper = mapper.name(), "Skipping resampling: absolute values missing");
            return Ok(self.clone());
        }

        let names = self.names();
        let from = self.timeframe.from_timestamp;
        let aligned_start = from - from.rem_euclid(width);

        let mut output = Vec::new();
        let mut read = 0;
        for index in 0i64.. {
            let start = aligned_start + width * index;
            let end = start + width;
            if end > self.timeframe.to_timestamp {
                break;
            }

            while read < self.records.len() && self.records[read].timestamp < start {
                read += 1;
            }
            let first = read;
            while read < self.records.len() && self.records[read].timestamp < end {
                read += 1;
            }

            let mut timestamp = start + width / 2;
            if index == 0 && timestamp < from {
                timestamp = from;
            }

            output.extend(mapper.map(&names, &self.records[first..read], timestamp, width)?);
        }

        debug!(
            mapper = mapper.name(),
            width,
            input = self.records.len(),
            output = output.len(),
            "Resampled series"
        );
        self.with_records(output)
    }

    pub fn map_all(&self, mapper: &dyn IntervalMapper) -> Result<Vec<TimedRecord>> {
        mapper.map(
            &self.names(),
            &self.records,
            self.timeframe.midpoint(),
            self.timeframe.length(),
        )
    }

    /// Value at `timestamp`: the exact record if present, otherwise a linear
    /// interpolation between the surrounding records. Outside the covered
    /// range the null vector is returned.
    pub fn value_at(&self, timestamp: i64) -> Result<NamedValues> {
        let index = match self
            .records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
        {
            Ok(i) => return Ok(self.records[i].value.clone()),
            Err(i) => i,
        };

        if index == 0 || index >= self.records.len() {
            return Ok(NamedValues::Null);
        }

        let r0 = &self.records[index - 1];
        let r1 = &self.records[index];
        let (t0, t1) = (r0.timestamp as f64, r1.timestamp as f64);
        let t = timestamp as f64;

        r0.value.combine(&r1.value, |v0, v1| {
            let dvdt = (v1 - v0) / (t1 - t0);
            v0 + dvdt * (t - t0)
        })
    }

    pub fn combine<F>(&self, other: &TimedSeries, combiner: F) -> Result<TimedSeries>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut records = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let divider = other.value_at(record.timestamp)?;
            if divider.is_null() {
                continue;
            }

            let combined = record.value.combine(&divider, &combiner)?;
            if !combined.is_null() {
                records.push(record.with_value(combined));
            }
        }

        self.with_records(records)
    }

    pub fn to_output(&self) -> SeriesOutput {
        let names = self.names();
        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut sigma: BTreeMap<String, f64> = BTreeMap::new();

        for name in &names {
            let column = self
                .records
                .iter()
                .map(|r| round5(r.value.get_or(name, f64::NAN)))
                .collect();
            values.insert(name.clone(), column);

            let total = self
                .records
                .iter()
                .filter(|r| !r.absolute.is_null())
                .map(|r| r.absolute.get_or(name, f64::NAN))
                .filter(|a| a.is_finite())
                .sum();
            sigma.insert(name.clone(), total);
        }

        SeriesOutput {
            timestamps: self.records.iter().map(|r| r.timestamp).collect(),
            sigma,
            values,
        }
    }
}

fn scalar_of(value: &DatapointValue, row: &StoredRow) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        MetricsError::validation(format!(
            "Row of {} at t={} holds named values; query it with named series",
            row.metric_name, row.timestamp
        ))
    })
}
