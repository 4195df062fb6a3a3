use crate::dedup::DedupWindow;
use crate::model::{AggregationModel, ModelSummary};
use crate::self_metrics::{BatchObservation, SelfMetrics};
use futures::future::try_join_all;
use metricflow_core::{
    Datapoint, DynClock, DynErrorSink, DynStore, ErrorReport, MetricKind, MetricsError,
    PipelineConfig, RawUpdate, Result, SystemClock,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub received: usize,
    pub duplicates: usize,
    pub accepted: usize,
    pub datapoints: usize,
}

struct WorkerState {
    model: AggregationModel,
    dedup: DedupWindow,
    age: u64,
}

/// Routes batches of raw updates through the aggregation model into storage.
///
/// Batches are processed one at a time; the worker state stays locked for
/// the whole call, including the storage writes.
pub struct IngestionService {
    state: Mutex<WorkerState>,
    store: DynStore,
    sink: DynErrorSink,
    self_metrics: SelfMetrics,
    clock: DynClock,
}

impl IngestionService {
    pub fn new(
        store: DynStore,
        sink: DynErrorSink,
        clock: DynClock,
        dedup_capacity: usize,
    ) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(WorkerState {
                model: AggregationModel::new(clock.clone()),
                dedup: DedupWindow::new(dedup_capacity),
                age: 0,
            }),
            store,
            sink,
            self_metrics: SelfMetrics::new(clock.clone())?,
            clock,
        })
    }

    pub fn from_config(
        config: &PipelineConfig,
        store: DynStore,
        sink: DynErrorSink,
    ) -> Result<Self> {
        Self::new(store, sink, Arc::new(SystemClock), config.dedup.capacity)
    }

    pub async fn process(&self, batches: Vec<Vec<RawUpdate>>) -> Result<IngestReport> {
        let mut state = self.state.lock().await;
        state.age += 1;

        let mut report = IngestReport::default();
        let mut accepted = Vec::new();

        for update in batches.into_iter().flatten() {
            report.received += 1;
            if state.dedup.insert(&update.id) {
                accepted.push(update);
            } else {
                report.duplicates += 1;
            }
        }
        report.accepted = accepted.len();

        info!(
            "Processing batch: {} received, {} duplicates",
            report.received, report.duplicates
        );

        self.self_metrics.record_batch(&BatchObservation {
            received: report.received,
            duplicates: report.duplicates,
            oldest_timestamp: accepted.iter().map(|u| u.timestamp).min(),
            dedup_window_size: state.dedup.len(),
            worker_age: state.age,
        });
        accepted.extend(self.self_metrics.drain());

        let mut datapoints = Vec::new();
        for update in &accepted {
            match state.model.put(update) {
                Ok(emitted) => datapoints.extend(emitted),
                Err(e) => {
                    let details = serde_json::json!({
                        "id": update.id,
                        "metricName": update.metric_name,
                    });
                    self.report_failure(&e, "ingest.put", details).await;
                    return Err(e);
                }
            }
        }

        self.sink
            .sample_log(
                "ingest.batch",
                serde_json::json!({
                    "received": report.received,
                    "duplicates": report.duplicates,
                    "accepted": report.accepted,
                    "datapoints": datapoints.len(),
                }),
            )
            .await;

        report.datapoints = self.write(&datapoints).await?;
        info!("Batch complete: {} datapoints written", report.datapoints);

        Ok(report)
    }

    /// Flushes every RATE entry, so rates are reported without reaching
    /// their sample threshold.
    pub async fn flush_rates(&self, timestamp: i64) -> Result<usize> {
        let mut state = self.state.lock().await;
        let names = state.model.names_of_kind(MetricKind::Rate);

        let datapoints: Vec<Datapoint> = names
            .iter()
            .filter_map(|name| state.model.flush(name, timestamp))
            .collect();

        debug!(
            "Flushed {} of {} rate entries",
            datapoints.len(),
            names.len()
        );
        self.write(&datapoints).await
    }

    pub async fn flush_rates_now(&self) -> Result<usize> {
        self.flush_rates(self.clock.now_millis()).await
    }

    pub async fn summarize(&self, names: &[String]) -> ModelSummary {
        self.state.lock().await.model.summarize(names)
    }

    async fn write(&self, datapoints: &[Datapoint]) -> Result<usize> {
        if datapoints.is_empty() {
            return Ok(0);
        }

        let writes = datapoints.iter().map(|d| self.store.put(d.to_row()));
        if let Err(e) = try_join_all(writes).await {
            error!("Datapoint write failed: {}", e);
            let details = serde_json::json!({ "datapoints": datapoints.len() });
            self.report_failure(&e, "ingest.write", details).await;
            return Err(e);
        }

        Ok(datapoints.len())
    }

    async fn report_failure(&self, err: &MetricsError, origin: &str, details: serde_json::Value) {
        let report = ErrorReport::from_error(err, origin).with_details(details);
        self.sink.notify(report).await;
    }
}
