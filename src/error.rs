use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong during a sync run.
///
/// Per-repository variants are caught by the run loop and turned into
/// statistics; `CatalogParse`, `Config` and `Settings` abort the whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("repository artifact unreachable at {url}")]
    Unreachable { url: String },

    #[error("network error calling GET {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} calling GET {url}")]
    HttpStatus { status: u16, url: String },

    #[error("malware detected in {repo_id}: {infected_files} infected file(s)")]
    Infected { repo_id: String, infected_files: u32 },

    #[error("malware scanner unavailable: {message}")]
    ScannerUnavailable { message: String },

    #[error("cannot parse repository catalog: {message}")]
    CatalogParse { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("invalid settings document {}: {message}", path.display())]
    Settings { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code when this error aborts the run. Configuration
    /// mistakes exit 2 so scripts can tell them from failed syncs.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Config { .. } => 2,
            _ => 1,
        }
    }
}
