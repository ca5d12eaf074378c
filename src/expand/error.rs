//! Error types for archive expansion.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while expanding one archive.
///
/// All variants are scoped to the archive in question: the archive itself is
/// left in place and the walk continues.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Creating an output or removing the original failed.
    #[error("IO error expanding {path}: {source}")]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be decoded or failed its integrity check.
    #[error("archive {path} is corrupt: {reason}")]
    Corrupt {
        /// The archive.
        path: PathBuf,
        /// What the decoder reported.
        reason: String,
    },

    /// The blocking expansion task panicked or was cancelled.
    #[error("expansion task for {path} did not complete: {source}")]
    Join {
        /// The archive.
        path: PathBuf,
        /// The join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ArchiveError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a corruption error from any decoder failure.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a join error.
    pub fn join(path: impl Into<PathBuf>, source: tokio::task::JoinError) -> Self {
        Self::Join {
            path: path.into(),
            source,
        }
    }
}
