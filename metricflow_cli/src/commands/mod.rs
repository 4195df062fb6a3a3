pub mod ingest;
pub mod inspect;
pub mod mappers;
pub mod query;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use metricflow_core::{
    parse_config_from_file, DynErrorSink, DynStore, FileErrorSink, FileStore, MemoryStore,
    PipelineConfig, RawUpdate, TracingErrorSink,
};
use metricflow_ingest::IngestReport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => parse_config_from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// The store named on the command line wins over the configured one. With
/// neither, datapoints live in memory for the duration of the command.
pub async fn open_store(
    config: &PipelineConfig,
    store_override: Option<PathBuf>,
) -> Result<DynStore> {
    match store_override.or_else(|| config.store.path.clone()) {
        Some(path) => {
            info!("Using datapoint store {}", path.display());
            let store = FileStore::open(&path)
                .await
                .with_context(|| format!("Failed to open store {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No datapoint store configured, keeping datapoints in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub fn open_sink(config: &PipelineConfig) -> DynErrorSink {
    match &config.error_log {
        Some(path) => Arc::new(FileErrorSink::new(path)),
        None => Arc::new(TracingErrorSink),
    }
}

/// A line holds either a batch (JSON array of updates) or a single update.
pub fn parse_batch(line: &str) -> Result<Vec<RawUpdate>> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let batch = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(batch)
}

pub async fn read_batches(path: &Path) -> Result<Vec<Vec<RawUpdate>>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            parse_batch(line)
                .with_context(|| format!("{}:{}: malformed batch", path.display(), i + 1))
        })
        .collect()
}

pub fn accumulate(total: &mut IngestReport, report: &IngestReport) {
    total.received += report.received;
    total.duplicates += report.duplicates;
    total.accepted += report.accepted;
    total.datapoints += report.datapoints;
}
