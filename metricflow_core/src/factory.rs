//! Producer-side instrumentation.
//!
//! A [`MetricFactory`] owns a queue of [`RawUpdate`]s. Typed [`Metric`]
//! handles enqueue updates stamped with a fresh id and the factory clock;
//! the queue is drained with [`MetricFactory::export_and_reset`].

use crate::clock::{DynClock, SystemClock};
use crate::datapoint::{RawUpdate, UpdateValue};
use crate::error::{MetricsError, Result};
use crate::kind::MetricKind;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    pub name: String,
    pub sample_size: usize,
    pub buffer_size: Option<usize>,
}

impl MetricConfig {
    pub fn new(name: impl Into<String>, sample_size: usize) -> Self {
        Self {
            name: name.into(),
            sample_size,
            buffer_size: None,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }
}

struct FactoryInner {
    queue: Mutex<Vec<RawUpdate>>,
    registered: Mutex<BTreeMap<String, MetricKind>>,
    flushing_threshold: usize,
    clock: DynClock,
}

#[derive(Clone)]
pub struct MetricFactory {
    inner: Arc<FactoryInner>,
}

impl Default for MetricFactory {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MetricFactory {
    pub fn new(flushing_threshold: usize) -> Self {
        Self::with_clock(flushing_threshold, Arc::new(SystemClock))
    }

    pub fn with_clock(flushing_threshold: usize, clock: DynClock) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                queue: Mutex::new(Vec::new()),
                registered: Mutex::new(BTreeMap::new()),
                flushing_threshold,
                clock,
            }),
        }
    }

    fn register(&self, name: &str, kind: MetricKind) -> Result<()> {
        let mut registered = self
            .inner
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if registered.contains_key(name) {
            return Err(MetricsError::validation(format!(
                "Name conflict on metric name \"{}\"",
                name
            )));
        }

        registered.insert(name.to_string(), kind);
        Ok(())
    }

    fn create<T: Into<UpdateValue>>(
        &self,
        kind: MetricKind,
        config: MetricConfig,
    ) -> Result<Metric<T>> {
        self.register(&config.name, kind)?;
        Ok(Metric {
            kind,
            config,
            factory: self.clone(),
            filter: None,
            _marker: PhantomData,
        })
    }

    pub fn new_rate(&self, config: MetricConfig) -> Result<Metric<f64>> {
        self.create(MetricKind::Rate, config)
    }

    pub fn new_gauge(&self, config: MetricConfig) -> Result<Metric<f64>> {
        self.create(MetricKind::Gauge, config)
    }

    pub fn new_percentile(&self, config: MetricConfig) -> Result<Metric<f64>> {
        self.create(MetricKind::Percentile, config)
    }

    pub fn new_percentile_bottom(&self, config: MetricConfig) -> Result<Metric<f64>> {
        self.create(MetricKind::PercentileBottom, config)
    }

    pub fn new_partitioning(&self, config: MetricConfig) -> Result<Metric<String>> {
        self.create(MetricKind::Partitioning, config)
    }

    pub fn metrics(&self) -> Vec<(String, MetricKind)> {
        self.inner
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, kind)| (name.clone(), *kind))
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn enqueue(&self, update: RawUpdate) {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
    }

    /// Drains the queue once it holds at least the flushing threshold;
    /// returns nothing otherwise.
    pub fn export_and_reset(&self) -> Vec<RawUpdate> {
        let mut queue = self
            .inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if queue.len() < self.inner.flushing_threshold {
            return Vec::new();
        }

        debug!(count = queue.len(), "Exporting queued updates");
        std::mem::take(&mut *queue)
    }
}

type ValueFilter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Metric<T> {
    kind: MetricKind,
    config: MetricConfig,
    factory: MetricFactory,
    filter: Option<ValueFilter<T>>,
    _marker: PhantomData<T>,
}

impl<T: Into<UpdateValue>> Metric<T> {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn accepts(&self, value: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(value))
    }

    pub fn put(&self, value: T) {
        self.put_with_labels(value, BTreeMap::new());
    }

    pub fn put_with_labels(&self, value: T, labels: BTreeMap<String, String>) {
        if !self.accepts(&value) {
            return;
        }
        let mut update = self.update(labels);
        update.metric_value = Some(value.into());
        self.factory.enqueue(update);
    }

    pub fn put_values(&self, values: Vec<T>) {
        let accepted: Vec<UpdateValue> = values
            .into_iter()
            .filter(|v| self.accepts(v))
            .map(Into::into)
            .collect();
        if accepted.is_empty() {
            return;
        }
        let mut update = self.update(BTreeMap::new());
        update.values = Some(accepted);
        self.factory.enqueue(update);
    }

    fn update(&self, labels: BTreeMap<String, String>) -> RawUpdate {
        RawUpdate {
            id: Uuid::new_v4().to_string(),
            metric_name: self.config.name.clone(),
            timestamp: self.factory.inner.clock.now_millis(),
            kind: self.kind,
            metric_value: None,
            values: None,
            sample_size: Some(self.config.sample_size),
            buffer_size: self.config.buffer_size,
            labels: Some(labels),
        }
    }
}
