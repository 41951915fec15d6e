//! CIE Ingest - command-line ingestion tool

use anyhow::{Context, Result};
use cie_common::logging::{init_logging, LogConfig, LogLevel};
use cie_ingest::store::DbConfig;
use cie_ingest::{load_config, IngestionService, MemoryStore, PgStore, Store};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cie-ingest")]
#[command(author, version, about = "Configuration-driven event ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and check a configuration directory
    Validate {
        /// Directory holding *_event.yml, *_addr.yml and *-rules.yml files
        #[arg(short, long, env = "CIE_CONFIG_DIR", default_value = "./config")]
        config_dir: PathBuf,
    },

    /// Ingest one event from a file
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Directory holding *_event.yml, *_addr.yml and *-rules.yml files
    #[arg(short, long, env = "CIE_CONFIG_DIR", default_value = "./config")]
    config_dir: PathBuf,

    /// Envelope JSON file
    #[arg(short, long)]
    file: PathBuf,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", conflicts_with = "dry_run")]
    database_url: Option<String>,

    /// Write into an in-memory store built from the configuration
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("cie-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Validate { config_dir } => validate(&config_dir),
        Command::Ingest(args) => ingest(args).await,
    }
}

fn validate(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)
        .with_context(|| format!("invalid configuration in {}", config_dir.display()))?;

    let mut events: Vec<_> = config.registry.events().collect();
    events.sort_by(|a, b| a.event_name.cmp(&b.event_name));

    for event in events {
        let tables: Vec<String> = event
            .tables
            .iter()
            .map(|t| format!("{}:{}({})", t.order, t.logical_key, t.kind))
            .collect();
        let rules = config.rules.rules_for(&event.event_name).map_or(0, |r| r.len());
        println!("{:<16} rules={:<3} tables={}", event.event_name, rules, tables.join(" "));
    }

    info!(events = config.registry.len(), "Configuration is valid");
    Ok(())
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let config = load_config(&args.config_dir)
        .with_context(|| format!("invalid configuration in {}", args.config_dir.display()))?;
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read event file {}", args.file.display()))?;

    if args.dry_run {
        let store = MemoryStore::from_registry(&config.registry, &config.policy);
        let service = IngestionService::from_config(store, config);
        run(&service, &raw).await?;

        let store = service.store();
        for sql in store.executed_statements() {
            info!(sql = %sql, "Would execute");
        }
        info!(rows = store.total_rows(), "Dry run complete, nothing persisted");
        return Ok(());
    }

    let url = args
        .database_url
        .context("either --database-url (or DATABASE_URL) or --dry-run is required")?;
    let store = PgStore::connect(&DbConfig::with_url(url)).await?;
    let service = IngestionService::from_config(store, config);
    run(&service, &raw).await
}

async fn run<S: Store>(service: &IngestionService<S>, raw: &str) -> Result<()> {
    let report = service.ingest(raw).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
