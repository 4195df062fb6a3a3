use crate::kind::MetricKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Lookup(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MetricsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Prefixes validation and lookup messages with the metric they concern.
    /// Storage and I/O errors pass through untouched.
    pub fn with_context(self, metric_name: &str, kind: Option<MetricKind>) -> Self {
        let prefix = match kind {
            Some(kind) => format!("(details: metricName={}, type={}) ", metric_name, kind),
            None => format!("(details: metricName={}, type=undefined) ", metric_name),
        };
        match self {
            Self::Validation(message) => Self::Validation(format!("{}{}", prefix, message)),
            Self::Lookup(message) => Self::Lookup(format!("{}{}", prefix, message)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
