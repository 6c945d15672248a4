//! PinSync CLI - Command line interface for event sync.
//!
//! Mirrors the remote event history into a local SQLite database and
//! inspects what has been mirrored.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use pinsync_common::EventDomain;
use pinsync_remote::create_default_registry;
use pinsync_store::{EventStore, LocalEvent, SqliteStore};
use pinsync_sync::{SyncReport, SyncService};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "pinsync")]
#[command(about = "PinSync - Mirror device event history locally")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to a JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database location.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Read events from a local fixture instead of the remote API.
    #[arg(long, global = true, value_name = "FIXTURE")]
    offline: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one domain, or every domain when none is given.
    Sync {
        /// Domain to sync: ai-mic, phone-call, translation or music.
        #[arg(short, long)]
        domain: Option<EventDomain>,

        /// Override the number of whole-run retries.
        #[arg(short, long)]
        retries: Option<u32>,
    },

    /// List locally stored events of a domain.
    List {
        /// Domain to list.
        #[arg(short, long)]
        domain: EventDomain,

        /// Show only the most recent N events.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show locally stored events by id.
    Show {
        /// Domain the events belong to.
        #[arg(short, long)]
        domain: EventDomain,

        /// Event ids.
        #[arg(required = true)]
        ids: Vec<Uuid>,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show local event counts.
    Status,

    /// Delete every locally stored event.
    SignOut,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if let Some(fixture) = cli.offline {
        config.source = "memory".to_string();
        config.fixture = Some(fixture);
    }

    match cli.command {
        Commands::Sync { domain, retries } => cmd_sync(&config, domain, retries).await,

        Commands::List {
            domain,
            limit,
            json,
        } => cmd_list(&config, domain, limit, json).await,

        Commands::Show { domain, ids, json } => cmd_show(&config, domain, ids, json).await,

        Commands::Status => cmd_status(&config).await,

        Commands::SignOut => cmd_sign_out(&config).await,
    }
}

/// Open the database and wire up the configured source.
fn build_service(config: &AppConfig) -> Result<SyncService> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store: Arc<dyn EventStore> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );

    let registry = create_default_registry()?;
    let source = registry
        .resolve(&config.source, config.source_options()?)
        .with_context(|| {
            format!(
                "Failed to set up source '{}' (available: {})",
                config.source,
                registry.sources().join(", ")
            )
        })?;

    info!("Using {} source, database {}", source.name(), db_path.display());
    Ok(SyncService::new(source, store, config.sync.clone())?)
}

fn print_report(report: &SyncReport) {
    println!(
        "  {:<12} {:>6} items  {:>6} removed  {:?}{}",
        report.domain.to_string(),
        report.processed,
        report.deleted,
        report.duration,
        if report.reconciled {
            ""
        } else {
            "  (cleanup skipped)"
        }
    );
}

/// Sync one or all domains.
async fn cmd_sync(config: &AppConfig, domain: Option<EventDomain>, retries: Option<u32>) -> Result<()> {
    let service = build_service(config)?;

    let mut retry = config.retry;
    if let Some(retries) = retries {
        retry.max_retries = retries;
    }

    let domains = match domain {
        Some(domain) => vec![domain],
        None => EventDomain::ALL.to_vec(),
    };

    println!("Sync results:");
    let mut failed = Vec::new();
    for domain in domains {
        match service.sync_with_retry(domain, &retry).await {
            Ok(report) => print_report(&report),
            Err(e) => {
                println!("  {:<12} failed: {}", domain.to_string(), e);
                failed.push(domain);
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("{} of the domains failed to sync", failed.len());
    }
    Ok(())
}

/// List locally stored events.
async fn cmd_list(
    config: &AppConfig,
    domain: EventDomain,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let service = build_service(config)?;
    let events = service
        .events(domain)
        .await
        .context("Failed to read events")?;

    let skip = limit.map_or(0, |limit| events.len().saturating_sub(limit));
    if events.is_empty() {
        println!("No {} events stored", domain);
        return Ok(());
    }

    print_events(&events[skip..], json)
}

fn print_events(events: &[LocalEvent], json: bool) -> Result<()> {
    for event in events {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!(
                "{}  {}  {}",
                event.created_at().format("%Y-%m-%d %H:%M:%S"),
                event.uuid(),
                event.summary()
            );
        }
    }
    Ok(())
}

/// Show stored events by id.
async fn cmd_show(config: &AppConfig, domain: EventDomain, ids: Vec<Uuid>, json: bool) -> Result<()> {
    let service = build_service(config)?;
    let ids: HashSet<Uuid> = ids.into_iter().collect();
    let wanted = ids.len();
    let events = service
        .get(domain, ids)
        .await
        .context("Failed to read events")?;

    print_events(&events, json)?;
    if events.len() < wanted {
        println!("{} of {} ids not stored as {}", wanted - events.len(), wanted, domain);
    }
    Ok(())
}

/// Show local counts.
async fn cmd_status(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    let counts = service.counts().await.context("Failed to count events")?;

    println!("Database: {}", config.database_path().display());
    for (kind, count) in counts {
        println!("  {:<12} {}", kind.as_str(), count);
    }

    Ok(())
}

/// Wipe local state.
async fn cmd_sign_out(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    let summary = service.sign_out().await.context("Failed to clear events")?;

    println!("Signed out, removed {} events", summary.deleted);
    Ok(())
}
