#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use template_catalog_sync::models::{PersistedState, StoredTemplate, TemplateRecord};
use template_catalog_sync::storage::MemoryStore;
use template_catalog_sync::{StoreTransaction, TemplateStore};

pub const HEADER: [&str; 7] = ["Category", "Genre", "Style", "Mood", "Use Case", "Tags", "Prompt"];

pub const CHILL: [&str; 7] = [
    "Chill Vibes",
    "Lo-fi",
    "Smooth",
    "Chill",
    "Study",
    "lofi, chill, study",
    "A relaxing lo-fi beat",
];

pub const NIGHT: [&str; 7] = [
    "Night Drive",
    "Synthwave",
    "Retro",
    "Moody",
    "Driving",
    "synth, retro",
    "Pulsing synths on an empty highway",
];

pub const FOCUS: [&str; 7] = [
    "Deep Focus",
    "Ambient",
    "Minimal",
    "Calm",
    "Work",
    "ambient, focus",
    "Slow evolving pads",
];

/// Renders a SpreadsheetML catalog with a header row followed by `rows`.
pub fn catalog(rows: &[[&str; 7]]) -> String {
    let mut table = String::new();
    for row in std::iter::once(&HEADER).chain(rows.iter()) {
        table.push_str("   <Row>\n");
        for value in row {
            table.push_str(&format!(
                "    <Cell><Data ss:Type=\"String\">{value}</Data></Cell>\n"
            ));
        }
        table.push_str("   </Row>\n");
    }
    format!(
        r#"<?xml version="1.0"?>
<Workbook xmlns="urn:schemas-microsoft-com:office:spreadsheet"
 xmlns:ss="urn:schemas-microsoft-com:office:spreadsheet">
 <Worksheet ss:Name="Templates">
  <Table>
{table}  </Table>
 </Worksheet>
</Workbook>
"#
    )
}

/// Store double that delegates to a [`MemoryStore`] but can fail chosen
/// record writes, the whole transaction at commit time, or panic outright.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    failing_ids: Arc<std::sync::Mutex<HashSet<String>>>,
    fail_commit: Arc<AtomicBool>,
    fail_deactivate: Arc<AtomicBool>,
    panic_on_begin: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deactivate(&self, fail: bool) {
        self.fail_deactivate.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_begin(&self, panic: bool) {
        self.panic_on_begin.store(panic, Ordering::SeqCst);
    }
}

#[async_trait]
impl TemplateStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        if self.panic_on_begin.load(Ordering::SeqCst) {
            panic!("store driver bug");
        }
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            failing_ids: self.failing_ids.lock().unwrap().clone(),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
            fail_deactivate: self.fail_deactivate.load(Ordering::SeqCst),
        }))
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        self.inner.list_templates().await
    }

    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>> {
        self.inner.get_template(id).await
    }
}

struct FaultyTransaction {
    inner: Box<dyn StoreTransaction>,
    failing_ids: HashSet<String>,
    fail_commit: bool,
    fail_deactivate: bool,
}

#[async_trait]
impl StoreTransaction for FaultyTransaction {
    async fn persisted_states(&mut self) -> Result<HashMap<String, PersistedState>> {
        self.inner.persisted_states().await
    }

    async fn create_template(&mut self, record: &TemplateRecord) -> Result<()> {
        if self.failing_ids.contains(&record.id) {
            bail!("unique constraint violated for '{}'", record.id);
        }
        self.inner.create_template(record).await
    }

    async fn update_template(&mut self, record: &TemplateRecord) -> Result<()> {
        if self.failing_ids.contains(&record.id) {
            bail!("check constraint violated for '{}'", record.id);
        }
        self.inner.update_template(record).await
    }

    async fn deactivate_templates(&mut self, ids: &[String]) -> Result<u64> {
        if self.fail_deactivate {
            bail!("connection reset during deactivation");
        }
        self.inner.deactivate_templates(ids).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            bail!("connection lost before commit");
        }
        self.inner.commit().await
    }
}

/// Store whose transactions cannot even be opened.
pub struct UnavailableStore;

#[async_trait]
impl TemplateStore for UnavailableStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        bail!("store unavailable")
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        bail!("store unavailable")
    }

    async fn get_template(&self, _id: &str) -> Result<Option<StoredTemplate>> {
        bail!("store unavailable")
    }
}

/// Store whose transactions wait for [`GatedStore::open_gate`], to hold a
/// sync pass in flight for as long as a test needs.
#[derive(Clone)]
pub struct GatedStore {
    pub inner: MemoryStore,
    gate: Arc<tokio::sync::Semaphore>,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
        }
    }

    /// Lets `passes` more transactions begin.
    pub fn open_gate(&self, passes: usize) {
        self.gate.add_permits(passes);
    }
}

#[async_trait]
impl TemplateStore for GatedStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.gate.acquire().await?.forget();
        self.inner.begin().await
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        self.inner.list_templates().await
    }

    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>> {
        self.inner.get_template(id).await
    }
}
