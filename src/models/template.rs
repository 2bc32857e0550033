use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lifecycle state of a persisted template. Templates are never physically
/// deleted; a template missing from the catalog is marked `Inactive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    #[default]
    Active,
    Inactive,
}

impl TemplateStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TemplateStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateStatus::Active => "active",
            TemplateStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(TemplateStatus::Active),
            "inactive" => Some(TemplateStatus::Inactive),
            _ => None,
        }
    }
}

/// A content-generation template as extracted from one catalog row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateRecord {
    pub id: String,
    pub category_name: String,
    pub genre: String,
    pub style: String,
    pub mood: String,
    pub use_case: String,
    pub tags: Vec<String>,
    pub base_prompt: String,
    pub status: TemplateStatus,
    pub fingerprint: String,
}

/// The seven catalog columns of a data row, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFields {
    pub category_name: String,
    pub genre: String,
    pub style: String,
    pub mood: String,
    pub use_case: String,
    pub tags: String,
    pub prompt: String,
}

impl TemplateFields {
    fn as_tuple(&self) -> [&str; 7] {
        [
            &self.category_name,
            &self.genre,
            &self.style,
            &self.mood,
            &self.use_case,
            &self.tags,
            &self.prompt,
        ]
    }

    /// Returns the name of the first required field that is empty, if any.
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.category_name.is_empty() {
            Some("category")
        } else if self.genre.is_empty() {
            Some("genre")
        } else if self.prompt.is_empty() {
            Some("prompt")
        } else {
            None
        }
    }
}

impl TemplateRecord {
    /// Builds an active record from extracted row fields. Returns `None` when
    /// the category name yields an empty slug.
    pub fn from_fields(fields: TemplateFields) -> Option<Self> {
        let id = slugify(&fields.category_name);
        if id.is_empty() {
            return None;
        }
        let fingerprint = fingerprint(&fields.as_tuple());
        let tags = split_tags(&fields.tags);
        Some(Self {
            id,
            category_name: fields.category_name,
            genre: fields.genre,
            style: fields.style,
            mood: fields.mood,
            use_case: fields.use_case,
            tags,
            base_prompt: fields.prompt,
            status: TemplateStatus::Active,
            fingerprint,
        })
    }
}

/// A template as held by a store, with bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTemplate {
    #[serde(flatten)]
    pub record: TemplateRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredTemplate {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Fingerprint and status of a persisted template, the only state the
/// reconciler needs to decide what to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub fingerprint: String,
    pub status: TemplateStatus,
}

/// Aggregated outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deactivated: usize,
    pub errors: Vec<String>,
}

/// Derives a stable identifier from a category name: ASCII-lowercased, with
/// every run of non-alphanumeric characters collapsed into a single `-` and
/// no leading or trailing `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// SHA-256 over the field tuple, each field prefixed with its byte length so
/// moving text between adjacent fields changes the digest.
pub fn fingerprint(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Splits a comma-delimited tag cell into trimmed, non-empty, unique tags,
/// keeping first-occurrence order.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
