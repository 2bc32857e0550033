//! Copy-on-begin transactions shared by the in-memory and filesystem stores.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::OwnedMutexGuard;

use super::StoreTransaction;
use crate::models::{PersistedState, StoredTemplate, TemplateRecord, TemplateStatus};

pub(crate) type Snapshot = BTreeMap<String, StoredTemplate>;

/// Holds the store lock for its whole lifetime and writes into a private
/// copy; commit swaps the copy in (after persisting it, when file-backed).
pub(crate) struct SnapshotTransaction {
    guard: OwnedMutexGuard<Snapshot>,
    working: Snapshot,
    persist_to: Option<PathBuf>,
}

impl SnapshotTransaction {
    pub(crate) fn new(guard: OwnedMutexGuard<Snapshot>, persist_to: Option<PathBuf>) -> Self {
        let working = guard.clone();
        Self {
            guard,
            working,
            persist_to,
        }
    }
}

#[async_trait]
impl StoreTransaction for SnapshotTransaction {
    async fn persisted_states(&mut self) -> Result<HashMap<String, PersistedState>> {
        Ok(self
            .working
            .iter()
            .map(|(id, stored)| {
                let state = PersistedState {
                    fingerprint: stored.record.fingerprint.clone(),
                    status: stored.record.status,
                };
                (id.clone(), state)
            })
            .collect())
    }

    async fn create_template(&mut self, record: &TemplateRecord) -> Result<()> {
        if self.working.contains_key(&record.id) {
            bail!("template '{}' already exists", record.id);
        }
        let now = Utc::now();
        let mut record = record.clone();
        record.status = TemplateStatus::Active;
        self.working.insert(
            record.id.clone(),
            StoredTemplate {
                record,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn update_template(&mut self, record: &TemplateRecord) -> Result<()> {
        let Some(stored) = self.working.get_mut(&record.id) else {
            bail!("template '{}' not found", record.id);
        };
        stored.record = record.clone();
        stored.record.status = TemplateStatus::Active;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate_templates(&mut self, ids: &[String]) -> Result<u64> {
        let now = Utc::now();
        let mut changed = 0;
        for id in ids {
            if let Some(stored) = self.working.get_mut(id) {
                if stored.record.status.is_active() {
                    stored.record.status = TemplateStatus::Inactive;
                    stored.updated_at = now;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let SnapshotTransaction {
            mut guard,
            working,
            persist_to,
        } = *self;
        if let Some(path) = persist_to {
            write_snapshot(&path, &working).await?;
        }
        *guard = working;
        Ok(())
    }
}

/// Loads a snapshot file; a missing file is an empty store.
pub(crate) async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read template store: {}", path.display()))
        }
    };
    let templates: Vec<StoredTemplate> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to deserialize template store: {}", path.display()))?;
    Ok(templates
        .into_iter()
        .map(|stored| (stored.record.id.clone(), stored))
        .collect())
}

/// Writes the snapshot to a sibling temp file and renames it over `path`, so
/// readers see either the old or the new store, never a partial one.
pub(crate) async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create store directory '{}'", parent.display()))?;
    }

    let templates: Vec<&StoredTemplate> = snapshot.values().collect();
    let contents = serde_json::to_string_pretty(&templates)
        .context("Failed to serialize template store")?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents.as_bytes())
        .await
        .with_context(|| format!("Failed to write template store: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to replace template store: {}", path.display()))
}
