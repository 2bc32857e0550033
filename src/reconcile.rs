use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::CatalogError;
use crate::models::{SyncResult, TemplateRecord};
use crate::storage::TemplateStore;

/// Brings the persisted template set in line with a freshly parsed one.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn TemplateStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    /// Creates new templates, updates changed or returning ones, and
    /// deactivates those absent from `records`, all in one transaction.
    ///
    /// A failed create or update is recorded in [`SyncResult::errors`] and the
    /// pass carries on. Failing to open, read, deactivate or commit aborts the
    /// pass with [`CatalogError::Transaction`] and leaves the store untouched.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn reconcile(&self, records: &[TemplateRecord]) -> Result<SyncResult, CatalogError> {
        let mut tx = self.store.begin().await.map_err(CatalogError::Transaction)?;
        let persisted = tx
            .persisted_states()
            .await
            .map_err(CatalogError::Transaction)?;

        let mut result = SyncResult::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());

        for record in records {
            if !seen.insert(record.id.as_str()) {
                warn!(id = %record.id, "Duplicate template id in sync input");
                result
                    .errors
                    .push(format!("{}: duplicate id in sync input, record ignored", record.id));
                continue;
            }

            match persisted.get(&record.id) {
                None => match tx.create_template(record).await {
                    Ok(()) => result.added += 1,
                    Err(e) => push_error(&mut result, "create", record, e),
                },
                // An inactive template that reappears is refreshed even when
                // its content did not change.
                Some(state)
                    if state.fingerprint != record.fingerprint || !state.status.is_active() =>
                {
                    match tx.update_template(record).await {
                        Ok(()) => result.updated += 1,
                        Err(e) => push_error(&mut result, "update", record, e),
                    }
                }
                Some(_) => result.unchanged += 1,
            }
        }

        let mut stale: Vec<String> = persisted
            .iter()
            .filter(|(id, state)| state.status.is_active() && !seen.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();
        if !stale.is_empty() {
            debug!(ids = ?stale, "Deactivating templates missing from the catalog");
            let changed = tx
                .deactivate_templates(&stale)
                .await
                .map_err(CatalogError::Transaction)?;
            result.deactivated = changed as usize;
        }

        tx.commit().await.map_err(CatalogError::Transaction)?;

        info!(
            added = result.added,
            updated = result.updated,
            unchanged = result.unchanged,
            deactivated = result.deactivated,
            errors = result.errors.len(),
            "Reconciled template store"
        );
        Ok(result)
    }
}

fn push_error(result: &mut SyncResult, action: &str, record: &TemplateRecord, error: anyhow::Error) {
    warn!(id = %record.id, action, error = %format!("{error:#}"), "Template write failed");
    result
        .errors
        .push(format!("{}: {action} failed: {error:#}", record.id));
}
