use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::snapshot::{read_snapshot, Snapshot, SnapshotTransaction};
use super::{StoreTransaction, TemplateStore};
use crate::models::StoredTemplate;

/// Stores all templates in a single JSON file. Commits replace the file
/// atomically, so a failed pass never leaves a half-written store behind.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    store_path: PathBuf,
    templates: Arc<Mutex<Snapshot>>,
}

impl FileSystemStore {
    /// Opens the store at `store_path`, loading it if the file exists.
    pub async fn open<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();
        let templates = read_snapshot(&store_path).await?;
        debug!(path = %store_path.display(), templates = templates.len(), "Opened filesystem template store");
        Ok(Self {
            store_path,
            templates: Arc::new(Mutex::new(templates)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }
}

#[async_trait]
impl TemplateStore for FileSystemStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.templates).lock_owned().await;
        Ok(Box::new(SnapshotTransaction::new(
            guard,
            Some(self.store_path.clone()),
        )))
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        Ok(self.templates.lock().await.values().cloned().collect())
    }

    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>> {
        Ok(self.templates.lock().await.get(id).cloned())
    }
}
