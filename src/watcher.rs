//! Re-syncs the store whenever the catalog file changes.
//!
//! Filesystem events and manual triggers feed one queue drained by a single
//! worker task, so two passes for the same catalog never overlap. A burst of
//! events is coalesced by waiting for `debounce` of silence before syncing;
//! requests that arrive during a pass trigger another pass once it finishes.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::SyncResult;
use crate::sync::CatalogSync;

/// Where the worker is in its `Idle → Debouncing → Syncing → Idle` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Debouncing,
    Syncing,
}

/// Result of one pass run by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Synced(SyncResult),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncRequest {
    FileChanged,
    Manual,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period required after the last change before a pass starts.
    pub debounce: Duration,
    /// When false only [`CatalogWatcher::trigger`] starts passes.
    pub watch_filesystem: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            watch_filesystem: true,
        }
    }
}

pub struct CatalogWatcher {
    requests: mpsc::UnboundedSender<SyncRequest>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WatchState>,
    outcomes: broadcast::Sender<PassOutcome>,
    fs_watcher: Option<RecommendedWatcher>,
    worker: JoinHandle<()>,
}

impl CatalogWatcher {
    /// Starts observing the catalog of `sync`. Must be called from within a
    /// Tokio runtime.
    pub fn start(sync: CatalogSync, options: WatchOptions) -> Result<Self> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WatchState::Idle);
        let (outcomes_tx, _) = broadcast::channel(16);

        let fs_watcher = if options.watch_filesystem {
            Some(observe_catalog(&sync, requests_tx.clone())?)
        } else {
            None
        };

        info!(
            catalog = %sync.catalog_path().display(),
            debounce_ms = options.debounce.as_millis() as u64,
            filesystem = options.watch_filesystem,
            "Watching template catalog"
        );

        let worker = tokio::spawn(run_worker(
            sync,
            requests_rx,
            shutdown_rx,
            options.debounce,
            state_tx,
            outcomes_tx.clone(),
        ));

        Ok(Self {
            requests: requests_tx,
            shutdown: shutdown_tx,
            state: state_rx,
            outcomes: outcomes_tx,
            fs_watcher,
            worker,
        })
    }

    /// Queues a sync as if the catalog had changed.
    pub fn trigger(&self) {
        let _ = self.requests.send(SyncRequest::Manual);
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// Receives the outcome of every pass that completes after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PassOutcome> {
        self.outcomes.subscribe()
    }

    /// Stops observing the catalog. A pass already running is allowed to
    /// finish; queued requests are dropped. Once this returns no further
    /// events are processed.
    pub async fn stop_watching(mut self) {
        let _ = self.shutdown.send(true);
        drop(self.fs_watcher.take());
        if let Err(e) = self.worker.await {
            error!(error = %e, "Catalog watcher worker ended abnormally");
        }
        info!("Stopped watching template catalog");
    }
}

fn observe_catalog(
    sync: &CatalogSync,
    requests: mpsc::UnboundedSender<SyncRequest>,
) -> Result<RecommendedWatcher> {
    let catalog = sync.catalog_path();
    let file_name = catalog
        .file_name()
        .map(ToOwned::to_owned)
        .ok_or_else(|| anyhow!("catalog path '{}' has no file name", catalog.display()))?;
    // Editors often save by writing a new file and renaming it over the old
    // one, so watch the directory rather than the file itself.
    let dir = match catalog.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_catalog_change(&event, &file_name) => {
            let _ = requests.send(SyncRequest::FileChanged);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "File watch error"),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory '{}'", dir.display()))?;
    Ok(watcher)
}

fn is_catalog_change(event: &Event, file_name: &OsString) -> bool {
    let relevant = match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => true,
        _ => false,
    };
    relevant
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

async fn run_worker(
    sync: CatalogSync,
    mut requests: mpsc::UnboundedReceiver<SyncRequest>,
    mut shutdown: watch::Receiver<bool>,
    debounce: Duration,
    state: watch::Sender<WatchState>,
    outcomes: broadcast::Sender<PassOutcome>,
) {
    'passes: loop {
        state.send_replace(WatchState::Idle);
        let first = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        state.send_replace(WatchState::Debouncing);
        let mut coalesced = 1usize;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break 'passes,
                next = tokio::time::timeout(debounce, requests.recv()) => match next {
                    Ok(Some(_)) => coalesced += 1,
                    Ok(None) => break 'passes,
                    Err(_quiet) => break,
                },
            }
        }

        debug!(trigger = ?first, coalesced, "Catalog settled, syncing");
        state.send_replace(WatchState::Syncing);
        // Each pass runs on its own task so a panic stays inside that pass.
        // Errors are already logged by the pass; the watcher keeps going.
        let pass = sync.clone();
        let outcome = match tokio::spawn(async move { pass.run_once().await }).await {
            Ok(Ok(result)) => PassOutcome::Synced(result),
            Ok(Err(e)) => PassOutcome::Failed(e.to_string()),
            Err(e) => {
                error!(error = %e, "Catalog sync pass aborted");
                PassOutcome::Failed(format!("sync pass aborted: {e}"))
            }
        };
        let _ = outcomes.send(outcome);
    }
    state.send_replace(WatchState::Idle);
}
