use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use template_catalog_sync::catalog;
use template_catalog_sync::config::{AppConfig, StoreBackend};
use template_catalog_sync::storage::open_store;
use template_catalog_sync::{CatalogSync, CatalogWatcher, Reconciler, WatchOptions};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = "catalog-sync.toml")]
    config: PathBuf,

    /// Catalog file to sync (overrides the configuration)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Storage backend (overrides the configuration)
    #[arg(long, value_enum)]
    store: Option<StoreBackend>,

    /// PostgreSQL connection URL
    #[arg(long)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the catalog's structure without touching the store
    Validate,
    /// Print the templates parsed from the catalog as JSON
    Parse,
    /// Sync the catalog into the store once
    Sync,
    /// Sync once, then re-sync whenever the catalog changes
    Watch,
    /// Print every stored template, inactive ones included
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let mut config = AppConfig::load_from(&args.config)?;
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }
    if let Some(url) = args.db_url {
        config.store.database_url = Some(url);
        config.store.backend = StoreBackend::Postgres;
    }
    if let Some(store) = args.store {
        config.store.backend = store;
    }

    // `RUST_LOG` wins over the configured filter.
    // Example: RUST_LOG=template_catalog_sync=debug template-catalog-sync watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    fmt().with_env_filter(filter).init();

    tracing::info!(command = ?args.command, catalog = %config.catalog_path.display(), "Starting template catalog sync");

    match args.command {
        Command::Validate => {
            let raw = tokio::fs::read_to_string(&config.catalog_path)
                .await
                .with_context(|| format!("Failed to read catalog {}", config.catalog_path.display()))?;
            if let Err(reason) = catalog::check(&raw) {
                bail!("{} is not a valid catalog: {reason}", config.catalog_path.display());
            }
            println!("{} looks like a valid catalog", config.catalog_path.display());
        }
        Command::Parse => {
            let raw = tokio::fs::read_to_string(&config.catalog_path)
                .await
                .with_context(|| format!("Failed to read catalog {}", config.catalog_path.display()))?;
            let records = catalog::parse(&raw)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Sync => {
            let sync = build_sync(&config).await?;
            let result = sync.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Watch => {
            let sync = build_sync(&config).await?;
            // A failed startup sync is fatal; later failures only get logged.
            sync.run_once().await?;

            if !config.watch.enabled {
                tracing::info!("Watching disabled in configuration, exiting after initial sync");
                return Ok(());
            }
            let options = WatchOptions {
                debounce: config.watch.debounce(),
                watch_filesystem: true,
            };
            let watcher = CatalogWatcher::start(sync, options)?;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested");
            watcher.stop_watching().await;
        }
        Command::List => {
            let store = open_store(&config.store).await?;
            let templates = store.list_templates().await?;
            println!("{}", serde_json::to_string_pretty(&templates)?);
        }
    }
    Ok(())
}

async fn build_sync(config: &AppConfig) -> Result<CatalogSync> {
    let store = open_store(&config.store).await?;
    Ok(CatalogSync::new(&config.catalog_path, Reconciler::new(store)))
}
