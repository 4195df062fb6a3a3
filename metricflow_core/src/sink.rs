//! Best-effort diagnostics side channels. Nothing here may fail the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub origin: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time_millis: Option<u64>,
}

impl ErrorReport {
    pub fn from_error(err: &(dyn std::error::Error + 'static), origin: impl Into<String>) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\ncaused by: ")),
            origin: origin.into(),
            details: serde_json::Value::Object(Default::default()),
            remaining_time_millis: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_remaining_time(mut self, millis: u64) -> Self {
        self.remaining_time_millis = Some(millis);
        self
    }
}

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn notify(&self, report: ErrorReport);

    async fn sample_log(&self, _key: &str, _data: serde_json::Value) {}
}

pub type DynErrorSink = Arc<dyn ErrorSink>;

#[derive(Debug, Default)]
pub struct TracingErrorSink;

#[async_trait]
impl ErrorSink for TracingErrorSink {
    async fn notify(&self, report: ErrorReport) {
        error!(
            origin = %report.origin,
            details = %report.details,
            "{}",
            report.message
        );
        if let Some(stack) = &report.stack {
            debug!("caused by: {}", stack);
        }
    }

    async fn sample_log(&self, key: &str, data: serde_json::Value) {
        info!(key, data = %data, "sampled log");
    }
}

/// Appends reports as JSON lines. Write failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct FileErrorSink {
    path: PathBuf,
}

impl FileErrorSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn append(&self, value: serde_json::Value) -> std::io::Result<()> {
        let mut line = value.to_string();
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl ErrorSink for FileErrorSink {
    async fn notify(&self, report: ErrorReport) {
        let value = serde_json::json!({ "error": report });
        if let Err(e) = self.append(value).await {
            debug!("Error sink write to {} failed: {}", self.path.display(), e);
        }
    }

    async fn sample_log(&self, key: &str, data: serde_json::Value) {
        let value = serde_json::json!({ "logSamplerStoreRequest": { "key": key, "data": data } });
        if let Err(e) = self.append(value).await {
            debug!("Log sampler write to {} failed: {}", self.path.display(), e);
        }
    }
}
