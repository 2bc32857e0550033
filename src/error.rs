use std::path::PathBuf;

/// Why the structural pre-check rejected a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("document is empty")]
    Empty,

    #[error("required <{0}> element is missing")]
    MissingMarker(&'static str),
}

/// Failure of a whole sync pass. Row-level problems never surface here; they
/// are skipped by the parser or collected into `SyncResult::errors`.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("catalog could not be parsed: {0}")]
    Parse(String),

    #[error("failed to read catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync transaction failed: {0:#}")]
    Transaction(anyhow::Error),
}
