use crate::kind::MetricKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
    #[serde(default)]
    pub error_log: Option<PathBuf>,
    #[serde(default)]
    pub metrics: Vec<MetricRegistration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRegistration {
    pub name: String,
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<String>,
}

impl MetricRegistration {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mapper: None,
        }
    }

    pub fn with_mapper(mut self, mapper: impl Into<String>) -> Self {
        self.mapper = Some(mapper.into());
        self
    }
}

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            dedup: DedupConfig::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            error_log: None,
            metrics: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.dedup.capacity == 0 {
            return Err("Dedup capacity must be > 0".to_string());
        }

        if self.flush_interval.is_zero() {
            return Err("Flush interval must be > 0".to_string());
        }

        let mut seen = HashSet::new();
        for (i, metric) in self.metrics.iter().enumerate() {
            if metric.name.is_empty() {
                return Err(format!("Metric {} name cannot be empty", i));
            }

            if !seen.insert(metric.name.as_str()) {
                return Err(format!("Name conflict on metric name \"{}\"", metric.name));
            }

            if let Some(mapper) = &metric.mapper {
                if mapper.is_empty() {
                    return Err(format!(
                        "Metric '{}' mapper override cannot be empty",
                        metric.name
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn kinds(&self) -> HashMap<String, MetricKind> {
        self.metrics
            .iter()
            .map(|m| (m.name.clone(), m.kind))
            .collect()
    }

    pub fn mapper_overrides(&self) -> HashMap<String, String> {
        self.metrics
            .iter()
            .filter_map(|m| m.mapper.as_ref().map(|mapper| (m.name.clone(), mapper.clone())))
            .collect()
    }

    pub fn metrics_of_kind(&self, kind: MetricKind) -> Vec<String> {
        self.metrics
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.name.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    store_path: Option<PathBuf>,
    dedup_capacity: Option<usize>,
    flush_interval: Option<Duration>,
    error_log: Option<PathBuf>,
    metrics: Vec<MetricRegistration>,
}

impl PipelineConfigBuilder {
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = Some(capacity);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    pub fn metric(mut self, registration: MetricRegistration) -> Self {
        self.metrics.push(registration);
        self
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            store: StoreConfig {
                path: self.store_path,
            },
            dedup: DedupConfig {
                capacity: self.dedup_capacity.unwrap_or(DEFAULT_DEDUP_CAPACITY),
            },
            flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
            error_log: self.error_log,
            metrics: self.metrics,
        }
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::builder()
            .dedup_capacity(10)
            .flush_interval(Duration::from_secs(5))
            .metric(MetricRegistration::new("api.requests", MetricKind::Rate).with_mapper("rate"))
            .metric(MetricRegistration::new("api.latency", MetricKind::Percentile))
            .build();

        assert!(config.validate().is_ok());
        assert_eq!(config.kinds().get("api.latency"), Some(&MetricKind::Percentile));
        assert_eq!(
            config.mapper_overrides().get("api.requests").map(String::as_str),
            Some("rate")
        );
        assert_eq!(config.metrics_of_kind(MetricKind::Rate), vec!["api.requests"]);
    }

    #[test]
    fn test_config_validation() {
        let duplicate = PipelineConfig::builder()
            .metric(MetricRegistration::new("m", MetricKind::Gauge))
            .metric(MetricRegistration::new("m", MetricKind::Rate))
            .build();
        assert_eq!(
            duplicate.validate().unwrap_err(),
            "Name conflict on metric name \"m\""
        );

        let zero = PipelineConfig::builder().dedup_capacity(0).build();
        assert!(zero.validate().is_err());

        let unnamed = PipelineConfig::builder()
            .metric(MetricRegistration::new("", MetricKind::Gauge))
            .build();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.dedup.capacity, DEFAULT_DEDUP_CAPACITY);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert!(config.store.path.is_none());
    }
}
