pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod storage;
pub mod sync;
pub mod watcher;

pub use crate::error::{CatalogError, ValidationError};
pub use crate::models::{SyncResult, TemplateRecord, TemplateStatus};
pub use crate::reconcile::Reconciler;
pub use crate::storage::{StoreTransaction, TemplateStore};
pub use crate::sync::CatalogSync;
pub use crate::watcher::{CatalogWatcher, PassOutcome, WatchOptions, WatchState};
