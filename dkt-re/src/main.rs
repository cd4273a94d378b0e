//! dkt-re - Docket movement reconciliation CLI
//!
//! Reconciles a batch of movements for one case against the local database,
//! sending only new or previously failed movements to the analysis provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dkt_common::config::TomlConfig;
use dkt_common::{Clock, SystemClock};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dkt_re::db::{CacheStore, EnrichmentStore, SqliteCacheStore, SqliteEnrichmentStore};
use dkt_re::models::Event;
use dkt_re::services::{AnalysisProvider, HttpAnalysisTransport, QuotaCounter, Reconciler, ResetPolicy};

/// Command-line arguments for dkt-re
#[derive(Parser, Debug)]
#[command(name = "dkt-re")]
#[command(about = "Reconcile docket movements and their analysis")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(long, global = true, env = "DKT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/dkt/config.toml, then /etc/dkt/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a JSON array of movements for one case
    Reconcile {
        #[arg(long)]
        parent: String,

        /// JSON file with the movements
        #[arg(long)]
        events: PathBuf,

        /// Case context passed to the analysis provider
        #[arg(long, default_value = "")]
        context: String,
    },

    /// Print stored records for one case as JSON
    Records {
        #[arg(long)]
        parent: String,
    },

    /// Remove expired response cache entries
    CachePurge,

    /// Free-form prompt answered through the response cache
    Ask {
        prompt: String,

        /// Cache lifetime in hours (default from config)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Store the provider API key in the database
    SetApiKey { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        dkt_common::config::load_config(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_directive(&toml_config).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root_folder = dkt_common::config::resolve_root_folder(
        args.root_folder.as_deref(),
        "DKT_ROOT_FOLDER",
        Some(&toml_config),
    );
    let db_path = dkt_common::config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db = dkt_re::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match args.command {
        Command::Reconcile {
            parent,
            events,
            context,
        } => {
            let events = read_events(&events)?;
            let provider = build_provider(&db, &toml_config, clock.clone()).await?;
            let store = Arc::new(SqliteEnrichmentStore::new(db.clone()));
            let reconciler = Reconciler::new(store, Arc::new(provider), clock);

            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

            let summary = reconciler
                .reconcile(&parent, &events, &context, &cancel)
                .await
                .context("Reconciliation failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Records { parent } => {
            let store = SqliteEnrichmentStore::new(db.clone());
            let records = store
                .load_records(&parent)
                .await
                .context("Failed to load records")?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Command::CachePurge => {
            let cache = SqliteCacheStore::new(db.clone(), clock);
            let removed = cache.purge_expired().await.context("Cache purge failed")?;
            println!("Removed {} expired cache entries", removed);
        }

        Command::Ask { prompt, ttl_hours } => {
            let hours = ttl_hours.unwrap_or(toml_config.cache.default_ttl_hours);
            let provider = build_provider(&db, &toml_config, clock.clone()).await?;
            let cache = SqliteCacheStore::new(db.clone(), clock);
            let answer = provider
                .generate_cached(&prompt, Duration::from_secs(hours.saturating_mul(3600)), &cache)
                .await
                .context("Generation failed")?;
            println!("{}", answer);
        }

        Command::SetApiKey { key } => {
            let toml_path = match args.config {
                Some(path) => path,
                None => dkt_common::config::user_config_path()
                    .context("No user config directory on this platform")?,
            };
            dkt_re::config::store_api_key(&db, key, &toml_path)
                .await
                .context("Failed to store API key")?;
            println!("API key stored");
        }
    }

    db.close().await;
    Ok(())
}

fn default_log_directive(config: &TomlConfig) -> String {
    format!("dkt_re={},dkt_common={}", config.logging.level, config.logging.level)
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid events in {}", path.display()))
}

async fn build_provider(
    db: &sqlx::SqlitePool,
    config: &TomlConfig,
    clock: Arc<dyn Clock>,
) -> Result<AnalysisProvider> {
    let api_key = dkt_re::config::resolve_analysis_api_key(db, config).await?;
    let analysis = &config.analysis;

    let transport = HttpAnalysisTransport::from_config(analysis, api_key)
        .context("Failed to create analysis client")?;
    let quota = QuotaCounter::new(
        analysis.daily_quota,
        ResetPolicy::Daily {
            utc_offset_hours: analysis.quota_utc_offset_hours,
        },
        clock,
    );

    Ok(AnalysisProvider::new(Arc::new(transport), Arc::new(quota))
        .with_timeout(Duration::from_secs(analysis.request_timeout_secs)))
}

/// Cancel the running batch on Ctrl-C; records already stored remain
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, finishing current movement");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
