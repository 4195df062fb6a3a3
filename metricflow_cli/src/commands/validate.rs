use crate::ui::{self, Tone};
use anyhow::Result;
use metricflow_core::{parse_config_from_file, MemoryStore};
use metricflow_query::{MapperRegistry, QueryService};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn execute(config_file: PathBuf) -> Result<()> {
    ui::banner("validate");
    ui::field("File", config_file.display());

    let checked = match parse_config_from_file(&config_file).await {
        Ok(config) => {
            let registry = MapperRegistry::with_defaults();
            QueryService::from_config(&config, Arc::new(MemoryStore::new()), &registry)
                .map(|_| config)
                .map_err(anyhow::Error::from)
        }
        Err(e) => Err(e),
    };

    match checked {
        Ok(config) => {
            println!();
            ui::status(Tone::Ok, "Configuration is valid!");
            println!();
            match &config.store.path {
                Some(path) => ui::field("Store", path.display()),
                None => ui::field("Store", "in-memory"),
            }
            ui::field("Dedup capacity", config.dedup.capacity);
            ui::field("Flush interval", humantime::format_duration(config.flush_interval));
            ui::field("Metrics", config.metrics.len());

            if config.metrics.is_empty() {
                println!();
                ui::status(Tone::Warn, "No metrics registered; queries will not be resampled");
            }

            for metric in &config.metrics {
                match &metric.mapper {
                    Some(mapper) => {
                        println!("    {} ({}, mapper: {})", metric.name, metric.kind, mapper)
                    }
                    None => println!("    {} ({})", metric.name, metric.kind),
                }
            }

            Ok(())
        }
        Err(e) => {
            println!();
            ui::status(Tone::Fail, "Configuration is invalid!");
            println!("\nError: {:#}", e);
            Err(e)
        }
    }
}
