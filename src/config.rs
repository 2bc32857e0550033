use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Backend that persists synced templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Filesystem,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Quiet period after the last write before the catalog is re-synced.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 2000,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Snapshot file used by the filesystem backend.
    pub path: PathBuf,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Filesystem,
            path: PathBuf::from("data/templates.json"),
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog_path: PathBuf,
    pub watch: WatchConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/templates.xml"),
            watch: WatchConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path` if it exists, then applies environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        }
        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| var(key).filter(|value| !value.is_empty());

        if let Some(path) = lookup("CATALOG_PATH") {
            self.catalog_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("CATALOG_DEBOUNCE_MS") {
            self.watch.debounce_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("CATALOG_DEBOUNCE_MS is not a number: {ms}"))?;
        }
        // A database URL in the environment means the deployment runs on Postgres.
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = Some(url);
            self.store.backend = StoreBackend::Postgres;
        }
        Ok(())
    }
}
