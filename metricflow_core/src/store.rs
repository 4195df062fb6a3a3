//! Datapoint storage collaborators.
//!
//! The engine only needs an ordered key-range store keyed by metric name and
//! timestamp. Writing a row whose key already exists replaces it.

use crate::datapoint::StoredRow;
use crate::error::{MetricsError, Result};
use crate::record::Timeframe;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[async_trait]
pub trait DatapointStore: Send + Sync {
    /// Rows of `metric_name` with `from <= t <= to`, ascending by timestamp.
    async fn fetch(&self, metric_name: &str, timeframe: Timeframe) -> Result<Vec<StoredRow>>;

    async fn put(&self, row: StoredRow) -> Result<()>;
}

pub type DynStore = Arc<dyn DatapointStore>;

type RowKey = (String, i64);

#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RowKey, StoredRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = StoredRow>) -> Self {
        let map = rows
            .into_iter()
            .map(|row| ((row.metric_name.clone(), row.timestamp), row))
            .collect();
        Self {
            rows: RwLock::new(map),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn rows(&self) -> Vec<StoredRow> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DatapointStore for MemoryStore {
    async fn fetch(&self, metric_name: &str, timeframe: Timeframe) -> Result<Vec<StoredRow>> {
        if timeframe.from_timestamp > timeframe.to_timestamp {
            return Ok(Vec::new());
        }
        let start = (metric_name.to_string(), timeframe.from_timestamp);
        let end = (metric_name.to_string(), timeframe.to_timestamp);
        Ok(self
            .rows
            .read()
            .await
            .range(start..=end)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn put(&self, row: StoredRow) -> Result<()> {
        self.rows
            .write()
            .await
            .insert((row.metric_name.clone(), row.timestamp), row);
        Ok(())
    }
}

/// A [`MemoryStore`] backed by an append-only JSON-lines file.
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    file: Mutex<tokio::fs::File>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut rows = Vec::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (index, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let row: StoredRow = serde_json::from_str(line).map_err(|e| {
                        MetricsError::storage(format!(
                            "{}:{}: malformed row: {}",
                            path.display(),
                            index + 1,
                            e
                        ))
                    })?;
                    rows.push(row);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Loaded {} rows from {}", rows.len(), path.display());

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            memory: MemoryStore::with_rows(rows),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.memory.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.is_empty().await
    }
}

#[async_trait]
impl DatapointStore for FileStore {
    async fn fetch(&self, metric_name: &str, timeframe: Timeframe) -> Result<Vec<StoredRow>> {
        self.memory.fetch(metric_name, timeframe).await
    }

    async fn put(&self, row: StoredRow) -> Result<()> {
        let mut line = serde_json::to_string(&row)?;
        line.push('\n');

        {
            let mut file = self.file.lock().await;
            append_line(&mut *file, line.as_bytes(), &self.path, &row.metric_name).await?;
        }

        debug!("Stored row {}@{}", row.metric_name, row.timestamp);
        self.memory.put(row).await
    }
}

async fn append_line<W>(
    writer: &mut W,
    line: &[u8],
    path: &Path,
    metric_name: &str,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let append_failed = |e: std::io::Error| {
        MetricsError::storage(format!(
            "append to {} failed. metricName={}. Cause: {}",
            path.display(),
            metric_name,
            e
        ))
    };

    writer.write_all(line).await.map_err(append_failed)?;
    writer.flush().await.map_err(append_failed)
}
