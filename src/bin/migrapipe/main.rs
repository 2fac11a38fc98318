mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use migrapipe::item::Cursor;
use migrapipe::jobs::{self, CollectMode, JobContext};
use migrapipe::pipeline::cancel::CancelToken;
use migrapipe::pipeline::config::PipelineConfig;
use migrapipe::remote::http::HttpService;
use migrapipe::report::summary::RunSummary;
use migrapipe::source::keys::{read_key_lines, read_yaml_keys};
use migrapipe::source::ndjson::NdjsonTable;

#[derive(Parser)]
#[command(
    name = "migrapipe",
    version,
    about = "Paginated, bounded-concurrency migration jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Pipeline settings YAML file
    #[arg(long, global = true, env = "MIGRAPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the pipeline-wide concurrency
    #[arg(short, long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-submit every stored payload of a table and render the result
    Rerender {
        /// NDJSON table of `{"key", "value"}` rows
        table: PathBuf,
        /// Service base URL
        service: String,
        /// Byte offset to resume the table from
        #[arg(long)]
        start_offset: Option<u64>,
    },
    /// Dump a table to a YAML (or JSON lines) file
    Collect {
        /// NDJSON table of `{"key", "value"}` rows
        table: PathBuf,
        /// Output file
        #[arg(short, long, default_value = "formulae.yaml")]
        output: PathBuf,
        /// Write `key: 1` instead of the payload
        #[arg(long)]
        keys_only: bool,
        /// Byte offset to resume the table from
        #[arg(long)]
        start_offset: Option<u64>,
    },
    /// Replay keys from an old service onto a new one and report failures
    Verify {
        /// File with one key per line
        keys: PathBuf,
        /// Old service base URL
        old: String,
        /// New service base URL
        new: String,
    },
    /// Retrieve, check and render every key of a YAML mapping
    Refresh {
        /// YAML file whose top-level keys are the items
        keys: PathBuf,
        /// Service base URL
        service: String,
        /// First key to process. Keys sorting before it are skipped, even
        /// when the key itself is not in the file
        #[arg(short, long)]
        start: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
        config.validate()?;
    }

    let cancel = CancelToken::new();
    spawn_ctrl_c(cancel.clone());
    let ctx = JobContext::new(config).with_cancel(cancel);

    let summary = match cli.command {
        Commands::Rerender {
            table,
            service,
            start_offset,
        } => {
            let service = Arc::new(HttpService::new(service)?);
            let start = start_offset.map(Cursor::from);
            jobs::rerender(&ctx, open_table(&table)?, &(), start, service).await?
        }
        Commands::Collect {
            table,
            output,
            keys_only,
            start_offset,
        } => {
            let mode = if keys_only {
                CollectMode::KeysOnly
            } else {
                CollectMode::Payload
            };
            let summary = jobs::collect(
                &ctx,
                open_table(&table)?,
                &(),
                start_offset.map(Cursor::from),
                &output,
                mode,
            )
            .await?;
            println!("Wrote {}", output.display());
            summary
        }
        Commands::Verify { keys, old, new } => {
            let keys = read_key_lines(&keys).await?;
            tracing::info!(keys = keys.len(), "Verifying keys");
            let old = Arc::new(HttpService::new(old)?);
            let new = Arc::new(HttpService::new(new)?);
            jobs::verify(&ctx, keys, old, new).await?
        }
        Commands::Refresh {
            keys,
            service,
            start,
        } => {
            let keys = read_yaml_keys(&keys, start.as_deref()).await?;
            tracing::info!(keys = keys.len(), "Refreshing keys");
            let service = Arc::new(HttpService::new(service)?);
            jobs::refresh(&ctx, keys, service).await?
        }
    };

    print_summary(&summary);
    Ok(())
}

fn open_table(path: &Path) -> anyhow::Result<NdjsonTable> {
    anyhow::ensure!(path.is_file(), "table not found: {}", path.display());
    Ok(NdjsonTable::open(path))
}

fn spawn_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping");
            cancel.cancel();
        }
    });
}

fn print_summary(summary: &RunSummary) {
    print!("{summary}");
    if !summary.reconciles() {
        eprintln!("warning: summary counts do not add up to the total");
    }
}
