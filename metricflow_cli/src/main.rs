mod commands;
mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "metricflow")]
#[command(about = "Streaming metric aggregation and time-series query pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an ingestion worker over JSON batches read from stdin
    Run {
        /// Path to pipeline config (YAML, TOML, or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Datapoint store file, overriding the config
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Ingest a file of update batches once
    Ingest {
        /// File with one batch (JSON array) or one update per line
        input: PathBuf,

        /// Path to pipeline config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Datapoint store file, overriding the config
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Flush RATE entries after the last batch
        #[arg(long)]
        flush: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a datapoint query
    Query {
        /// Query request JSON file, or '-' for stdin
        request: PathBuf,

        /// Path to pipeline config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Datapoint store file, overriding the config
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Ingest a file in memory and show the per-metric aggregation state
    Inspect {
        /// File with one batch or one update per line
        input: PathBuf,

        /// Only show these metrics
        #[arg(short, long)]
        name: Vec<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline config file
    Validate {
        /// Path to pipeline config
        config: PathBuf,
    },

    /// List available resampling mappers
    Mappers,
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false);

    match &cli.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            subscriber.with_ansi(false).with_writer(writer).init();
            Ok(Some(guard))
        }
        None => {
            subscriber.with_writer(std::io::stderr).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    match cli.command {
        Commands::Run { config, store } => {
            commands::run::execute(config, store).await?;
        }

        Commands::Ingest {
            input,
            config,
            store,
            flush,
            json,
        } => {
            commands::ingest::execute(input, config, store, flush, json).await?;
        }

        Commands::Query {
            request,
            config,
            store,
            pretty,
        } => {
            commands::query::execute(request, config, store, pretty).await?;
        }

        Commands::Inspect { input, name, json } => {
            commands::inspect::execute(input, name, json).await?;
        }

        Commands::Validate { config } => {
            commands::validate::execute(config).await?;
        }

        Commands::Mappers => {
            commands::mappers::execute().await?;
        }
    }

    Ok(())
}
