//! Error taxonomy for the knowledge base.
//!
//! Components return [`KbError`]; the binary wraps it with `anyhow`
//! context at the command boundary.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    /// Directory name or a collaborator file does not follow the run convention.
    #[error("Malformed analysis run {path}: {reason}")]
    MalformedRun { path: PathBuf, reason: String },

    /// The index references a summary record whose file is gone.
    #[error("Summary record for {code} is missing: {path}")]
    RecordMissing { code: String, path: PathBuf },

    /// The summary record exists but cannot be read back.
    #[error("Summary record for {code} is unreadable: {path}: {reason}")]
    RecordUnreadable {
        code: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Company not found in index: {0}")]
    NotFound(String),

    /// The registry could not be durably rewritten. The prior state is intact.
    #[error("Failed to write index {path}: {source}")]
    IndexWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read index {path}: {reason}")]
    IndexRead { path: PathBuf, reason: String },

    /// Read-back of a freshly written archive did not match the source subtree.
    #[error("Archive integrity check failed for {path}: {reason}")]
    ArchiveIntegrity { path: PathBuf, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KbError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedRun {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
