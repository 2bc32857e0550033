use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::catalog;
use crate::error::CatalogError;
use crate::models::SyncResult;
use crate::reconcile::Reconciler;

/// One catalog file bound to the store it is synced into.
#[derive(Clone)]
pub struct CatalogSync {
    catalog_path: PathBuf,
    reconciler: Reconciler,
}

impl CatalogSync {
    pub fn new(catalog_path: impl AsRef<Path>, reconciler: Reconciler) -> Self {
        Self {
            catalog_path: catalog_path.as_ref().to_path_buf(),
            reconciler,
        }
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Reads the catalog as it is now, parses it and reconciles the store.
    ///
    /// Validation and parse failures return before anything is written; a
    /// failed transaction leaves the store as it was.
    #[instrument(skip(self), fields(pass = %Uuid::new_v4(), catalog = %self.catalog_path.display()))]
    pub async fn run_once(&self) -> Result<SyncResult, CatalogError> {
        let outcome = self.run_pass().await;
        match &outcome {
            Ok(result) => info!(
                added = result.added,
                updated = result.updated,
                unchanged = result.unchanged,
                deactivated = result.deactivated,
                errors = result.errors.len(),
                "Catalog sync finished"
            ),
            Err(e) => error!(error = %e, "Catalog sync failed, store left unchanged"),
        }
        outcome
    }

    async fn run_pass(&self) -> Result<SyncResult, CatalogError> {
        let raw = fs::read_to_string(&self.catalog_path)
            .await
            .map_err(|source| CatalogError::Read {
                path: self.catalog_path.clone(),
                source,
            })?;
        let records = catalog::parse(&raw)?;
        self.reconciler.reconcile(&records).await
    }
}
