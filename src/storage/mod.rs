use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::models::{PersistedState, StoredTemplate, TemplateRecord};

pub mod filesystem;
pub mod memory;
pub mod postgres;
mod snapshot;

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Trait defining the interface for template storage backends.
#[async_trait]
pub trait TemplateStore: Send + Sync + 'static { // Send + Sync for Arc<dyn TemplateStore>
    /// Opens a transaction. Nothing written through it is visible to other
    /// readers until [`StoreTransaction::commit`] succeeds.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Lists every persisted template, inactive ones included, ordered by id.
    async fn list_templates(&self) -> Result<Vec<StoredTemplate>>;

    /// Retrieves a specific template by its id.
    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>>;
}

/// Writes of a single sync pass. Dropping the transaction without committing
/// rolls every write back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Id → fingerprint and status of every persisted template.
    async fn persisted_states(&mut self) -> Result<HashMap<String, PersistedState>>;

    /// Inserts a new template. A failure leaves the transaction usable.
    async fn create_template(&mut self, record: &TemplateRecord) -> Result<()>;

    /// Replaces every field of an existing template and marks it active.
    /// A failure leaves the transaction usable.
    async fn update_template(&mut self, record: &TemplateRecord) -> Result<()>;

    /// Marks the given active templates inactive, leaving their other fields
    /// untouched. Returns how many templates changed.
    async fn deactivate_templates(&mut self, ids: &[String]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Opens the backend selected by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn TemplateStore>> {
    let store: Arc<dyn TemplateStore> = match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory template store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Filesystem => {
            tracing::info!(path = %config.path.display(), "Using filesystem template store");
            Arc::new(FileSystemStore::open(&config.path).await?)
        }
        StoreBackend::Postgres => {
            let db_url = config
                .database_url
                .as_deref()
                .context("a database URL is required for the postgres store")?;
            tracing::info!("Using PostgreSQL template store");
            let pg_store = PostgresStore::new(db_url, config.max_connections).await?;
            pg_store.init_schema().await?;
            tracing::info!("Database schema initialized (if not exists)");
            Arc::new(pg_store)
        }
    };
    Ok(store)
}
