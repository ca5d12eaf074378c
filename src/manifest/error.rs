//! Error types for manifest persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Reading, appending, syncing or renaming the log failed.
    #[error("manifest IO error at {path}: {source}")]
    Io {
        /// The manifest (or temporary snapshot) path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[error("failed to serialize manifest record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A persisted record could not be parsed and the abort policy is active.
    #[error("manifest {path} is corrupt at line {line}: {source}")]
    Corrupt {
        /// The manifest path.
        path: PathBuf,
        /// 1-based line number of the first unreadable record.
        line: usize,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },
}

impl ManifestError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
