//! Instrumentation of the ingestion worker itself.
//!
//! Updates are produced through a private [`MetricFactory`] and fed back
//! into the same model as producer updates.

use metricflow_core::{DynClock, Metric, MetricConfig, MetricFactory, RawUpdate, Result};

pub const BATCHES: &str = "metricflow.batches";
pub const DUPLICATES: &str = "metricflow.duplicates";
pub const RECORDS_PER_BATCH: &str = "metricflow.records_per_batch";
pub const OLDEST_RECORD_AGE: &str = "metricflow.oldest_record_age";
pub const DEDUP_WINDOW_SIZE: &str = "metricflow.dedup_window_size";
pub const WORKER_AGE: &str = "metricflow.worker_age";

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchObservation {
    pub received: usize,
    pub duplicates: usize,
    pub oldest_timestamp: Option<i64>,
    pub dedup_window_size: usize,
    pub worker_age: u64,
}

pub struct SelfMetrics {
    factory: MetricFactory,
    clock: DynClock,
    batches: Metric<f64>,
    duplicates: Metric<f64>,
    records_per_batch: Metric<f64>,
    oldest_record_age: Metric<f64>,
    dedup_window_size: Metric<f64>,
    worker_age: Metric<f64>,
}

impl SelfMetrics {
    pub fn new(clock: DynClock) -> Result<Self> {
        let factory = MetricFactory::with_clock(1, clock.clone());

        Ok(Self {
            batches: factory.new_rate(MetricConfig::new(BATCHES, 50))?,
            duplicates: factory.new_rate(MetricConfig::new(DUPLICATES, 100))?,
            records_per_batch: factory.new_percentile(MetricConfig::new(RECORDS_PER_BATCH, 100))?,
            oldest_record_age: factory.new_percentile(MetricConfig::new(OLDEST_RECORD_AGE, 100))?,
            dedup_window_size: factory.new_gauge(MetricConfig::new(DEDUP_WINDOW_SIZE, 100))?,
            worker_age: factory.new_gauge(MetricConfig::new(WORKER_AGE, 1000))?,
            factory,
            clock,
        })
    }

    pub fn names() -> [&'static str; 6] {
        [
            BATCHES,
            DUPLICATES,
            RECORDS_PER_BATCH,
            OLDEST_RECORD_AGE,
            DEDUP_WINDOW_SIZE,
            WORKER_AGE,
        ]
    }

    pub fn record_batch(&self, observation: &BatchObservation) {
        if let Some(oldest) = observation.oldest_timestamp {
            let age = self.clock.now_millis() - oldest;
            self.oldest_record_age.put(age as f64);
        }

        self.batches.put(1.0);
        self.worker_age.put(observation.worker_age as f64);
        self.records_per_batch.put(observation.received as f64);
        self.duplicates.put(observation.duplicates as f64);
        self.dedup_window_size.put(observation.dedup_window_size as f64);
    }

    pub fn drain(&self) -> Vec<RawUpdate> {
        self.factory.export_and_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricflow_core::{MetricKind, MockClock, UpdateValue};
    use std::sync::Arc;

    #[test]
    fn test_record_batch() {
        let clock = Arc::new(MockClock::with_millis(10_000));
        let metrics = SelfMetrics::new(clock).unwrap();

        metrics.record_batch(&BatchObservation {
            received: 12,
            duplicates: 2,
            oldest_timestamp: Some(7_000),
            dedup_window_size: 10,
            worker_age: 1,
        });

        let updates = metrics.drain();
        assert_eq!(updates.len(), 6);
        assert!(metrics.drain().is_empty());

        let age = updates
            .iter()
            .find(|u| u.metric_name == OLDEST_RECORD_AGE)
            .unwrap();
        assert_eq!(age.kind, MetricKind::Percentile);
        assert_eq!(age.metric_value, Some(UpdateValue::Number(3_000.0)));
        assert_eq!(age.timestamp, 10_000);

        let dups = updates.iter().find(|u| u.metric_name == DUPLICATES).unwrap();
        assert_eq!(dups.kind, MetricKind::Rate);
        assert_eq!(dups.metric_value, Some(UpdateValue::Number(2.0)));
    }

    #[test]
    fn test_empty_batch_skips_age() {
        let metrics = SelfMetrics::new(Arc::new(MockClock::default())).unwrap();
        metrics.record_batch(&BatchObservation::default());
        let updates = metrics.drain();
        assert_eq!(updates.len(), 5);
        assert!(updates.iter().all(|u| u.metric_name != OLDEST_RECORD_AGE));
    }
}
