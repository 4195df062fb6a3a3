use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// Guesses the format of an extension-less file from its first
    /// meaningful line.
    pub fn detect(content: &str) -> Self {
        let first = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'));

        match first {
            Some(line) if line.starts_with('{') => ConfigFormat::Json,
            Some(line) if line.starts_with('[') => ConfigFormat::Toml,
            Some(line) if is_toml_assignment(line) => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(anyhow!(
                "Unsupported config format '{}' (expected yaml, toml or json)",
                other
            )),
        }
    }
}

// `key = value` is TOML, `key: value` is YAML.
fn is_toml_assignment(line: &str) -> bool {
    match (line.find('='), line.find(':')) {
        (Some(eq), Some(colon)) => eq < colon,
        (Some(_), None) => true,
        _ => false,
    }
}

pub async fn parse_config_from_file(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .unwrap_or_else(|| ConfigFormat::detect(&contents));
    parse_config(&contents, format)
}

pub fn parse_config_from_str(content: &str, format: &str) -> Result<PipelineConfig> {
    parse_config(content, format.parse()?)
}

pub fn parse_config(content: &str, format: ConfigFormat) -> Result<PipelineConfig> {
    let config: PipelineConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::MetricKind;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store:
  path: datapoints.jsonl
dedup:
  capacity: 500
flush_interval: 30s
metrics:
  - name: api.latency
    kind: PERCENTILE
  - name: api.requests
    kind: RATE
    mapper: rate
"#;

        let config = parse_config(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.dedup.capacity, 500);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.metrics.len(), 2);
        assert_eq!(config.metrics[1].mapper.as_deref(), Some("rate"));
    }

    #[test]
    fn test_parse_toml_is_flat() {
        let toml = r#"
flush_interval = "1m"

[dedup]
capacity = 250

[[metrics]]
name = "checkout.region"
kind = "PARTITIONING"
"#;

        let config = parse_config(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.flush_interval, Duration::from_secs(60));
        assert_eq!(config.dedup.capacity, 250);
        assert_eq!(config.metrics[0].kind, MetricKind::Partitioning);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"
{
  "flush_interval": "10s",
  "metrics": [
    { "name": "queue.depth", "kind": 3 }
  ]
}
"#;

        let config = parse_config(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.metrics[0].kind, MetricKind::Gauge);
        assert_eq!(config.dedup.capacity, crate::config::DEFAULT_DEDUP_CAPACITY);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let yaml = r#"
metrics:
  - name: a
    kind: GAUGE
  - name: a
    kind: RATE
"#;
        assert!(parse_config(yaml, ConfigFormat::Yaml).is_err());
        assert!(parse_config_from_str("{}", "ini").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("pipeline.YML")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("pipeline.toml")),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(ConfigFormat::from_path(&PathBuf::from("pipeline")), None);
        assert_eq!(ConfigFormat::from_path(&PathBuf::from("pipeline.ini")), None);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ConfigFormat::detect("{\"metrics\": []}"), ConfigFormat::Json);
        assert_eq!(
            ConfigFormat::detect("# pipeline\n[dedup]\ncapacity = 5\n"),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::detect("flush_interval = \"5s\"\n"),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::detect("flush_interval: 5s\nmetrics: []\n"),
            ConfigFormat::Yaml
        );
        assert_eq!(ConfigFormat::detect(""), ConfigFormat::Yaml);
    }

    #[tokio::test]
    async fn test_parse_file_without_extension() {
        let path = std::env::temp_dir()
            .join(format!("metricflow-config-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "[[metrics]]\nname = \"q\"\nkind = \"GAUGE\"\n")
            .await
            .unwrap();

        let config = parse_config_from_file(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.metrics[0].name, "q");
        assert_eq!(config.metrics[0].kind, MetricKind::Gauge);
    }
}
