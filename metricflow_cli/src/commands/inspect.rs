use super::read_batches;
use crate::ui::{self, Tone};
use anyhow::Result;
use chrono::{DateTime, Utc};
use metricflow_core::{MemoryStore, PipelineConfig, TracingErrorSink};
use metricflow_ingest::{EntrySummary, IngestionService};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Updates")]
    updates: u64,
    #[tabled(rename = "Datapoints")]
    datapoints: u64,
    #[tabled(rename = "Last datapoint")]
    last_datapoint: String,
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl From<&EntrySummary> for EntryRow {
    fn from(summary: &EntrySummary) -> Self {
        Self {
            name: summary.metric_name.clone(),
            kind: summary.kind.to_string(),
            updates: summary.stats.num_updates,
            datapoints: summary.stats.num_datapoints,
            last_datapoint: format_time(summary.stats.last_datapoint),
        }
    }
}

pub async fn execute(input: PathBuf, names: Vec<String>, json: bool) -> Result<()> {
    let config = PipelineConfig::default();
    let batches = read_batches(&input).await?;
    let service = IngestionService::from_config(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(TracingErrorSink),
    )?;

    service.process(batches).await?;
    let summary = service.summarize(&names).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    ui::banner("inspect");
    if summary.metrics.is_empty() {
        ui::status(Tone::Warn, "No matching metrics");
    } else {
        let rows: Vec<EntryRow> = summary.metrics.iter().map(EntryRow::from).collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    ui::status(
        Tone::Note,
        &format!(
            "{} records processed in {}s",
            summary.num_records, summary.uptime_in_seconds
        ),
    );

    Ok(())
}
