use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain one game log from the statistics source.
///
/// Always absorbed by the orchestrator: the affected period is skipped.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request for {target} failed: {source}")]
    Unavailable {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http {status} for {target}")]
    Status {
        target: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid game log json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Malformed(#[from] NormalizeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("split {index} is missing required `{field}`")]
    MissingField { index: usize, field: &'static str },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable at {target}: {source}")]
    Unavailable {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create store directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema mismatch on `{table}`: {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("statement failed: {0}")]
    Statement(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn schema_mismatch(table: &str, detail: impl Into<String>) -> Self {
        StoreError::SchemaMismatch {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    /// Errors that must abort the whole run rather than a single stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Directory { .. })
    }
}
