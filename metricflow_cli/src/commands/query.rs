use super::{load_config, open_store};
use anyhow::{Context, Result};
use metricflow_query::{MapperRegistry, QueryRequest, QueryService};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;

async fn read_request(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut contents = String::new();
        tokio::io::stdin().read_to_string(&mut contents).await?;
        return Ok(contents);
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn execute(
    request: PathBuf,
    config: Option<PathBuf>,
    store: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    let config = load_config(config.as_deref()).await?;
    let contents = read_request(&request).await?;
    let request: QueryRequest =
        serde_json::from_str(&contents).context("Malformed query request")?;

    let store = open_store(&config, store).await?;
    let registry = MapperRegistry::with_defaults();
    let service = QueryService::from_config(&config, store, &registry)?;

    let response = service.execute(request).await?;
    info!("Answered {} queries", response.output.len());

    let rendered = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", rendered);

    Ok(())
}
