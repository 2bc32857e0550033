pub mod template;

pub use template::{
    fingerprint, slugify, split_tags, PersistedState, StoredTemplate, SyncResult, TemplateFields,
    TemplateRecord, TemplateStatus,
};
