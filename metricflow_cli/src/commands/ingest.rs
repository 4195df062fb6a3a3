use super::{load_config, open_sink, open_store, read_batches};
use crate::ui::{self, Tone};
use anyhow::Result;
use metricflow_ingest::{IngestReport, IngestionService};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Metric")]
    label: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
}

fn report_rows(report: &IngestReport, flushed: usize) -> Vec<ReportRow> {
    [
        ("Updates received", report.received),
        ("Duplicates", report.duplicates),
        ("Updates accepted", report.accepted),
        ("Datapoints written", report.datapoints + flushed),
    ]
    .into_iter()
    .map(|(label, count)| ReportRow { label, count })
    .collect()
}

pub async fn execute(
    input: PathBuf,
    config: Option<PathBuf>,
    store: Option<PathBuf>,
    flush: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config.as_deref()).await?;
    let batches = read_batches(&input).await?;
    let store = open_store(&config, store).await?;
    let service = IngestionService::from_config(&config, store, open_sink(&config))?;

    let report = service.process(batches).await?;
    let flushed = if flush { service.flush_rates_now().await? } else { 0 };

    if json {
        let mut value = serde_json::to_value(report)?;
        value["flushed"] = serde_json::json!(flushed);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    ui::banner("ingest");
    println!("{}", Table::new(report_rows(&report, flushed)).with(Style::rounded()));
    if report.duplicates > 0 {
        ui::status(
            Tone::Warn,
            &format!("{} duplicate updates were dropped", report.duplicates),
        );
    }
    ui::status(Tone::Ok, &format!("Ingested {}", input.display()));

    Ok(())
}
