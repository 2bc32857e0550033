use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::snapshot::{Snapshot, SnapshotTransaction};
use super::{StoreTransaction, TemplateStore};
use crate::models::StoredTemplate;

/// Process-local store. Transactions are serialized by a lock held from
/// `begin` until commit or drop.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    templates: Arc<Mutex<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.templates).lock_owned().await;
        Ok(Box::new(SnapshotTransaction::new(guard, None)))
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        Ok(self.templates.lock().await.values().cloned().collect())
    }

    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>> {
        Ok(self.templates.lock().await.get(id).cloned())
    }
}
