use super::{accumulate, load_config, open_sink, open_store, parse_batch};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use metricflow_ingest::{IngestReport, IngestionService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn execute(config_path: PathBuf, store: Option<PathBuf>) -> Result<()> {
    let config = load_config(Some(config_path.as_path())).await?;
    let store = open_store(&config, store).await?;
    let service = Arc::new(IngestionService::from_config(&config, store, open_sink(&config))?);

    info!(
        "Ingestion worker started (flush every {})",
        humantime::format_duration(config.flush_interval)
    );

    let token = CancellationToken::new();

    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    let flusher = tokio::spawn(flush_loop(
        service.clone(),
        config.flush_interval,
        token.clone(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut totals = IngestReport::default();
    let mut batches = 0usize;
    let mut rejected = 0usize;

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            debug!("Input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let batch = match parse_batch(&line) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Skipping malformed batch: {}", e);
                rejected += 1;
                continue;
            }
        };

        batches += 1;
        match service.process(vec![batch]).await {
            Ok(report) => accumulate(&mut totals, &report),
            Err(e) => {
                warn!("Batch rejected: {}", e);
                rejected += 1;
            }
        }
    }

    token.cancel();
    flusher.await?;
    let flushed = service.flush_rates_now().await?;

    ui::banner("worker stopped");
    ui::field("Batches", batches);
    ui::field("Rejected batches", rejected);
    ui::field("Updates received", totals.received);
    ui::field("Duplicates", totals.duplicates);
    ui::field("Datapoints written", (totals.datapoints + flushed).to_string().green());

    Ok(())
}

async fn flush_loop(service: Arc<IngestionService>, period: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                match service.flush_rates_now().await {
                    Ok(n) => debug!("Periodic flush wrote {} datapoints", n),
                    Err(e) => warn!("Periodic flush failed: {}", e),
                }
            }
        }
    }
}
