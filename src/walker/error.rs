//! Run-fatal walk failures.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::manifest::ManifestError;

/// Errors that stop a whole run.
///
/// Branch, leaf and archive failures are not errors at this level: they are
/// logged, counted in [`super::WalkStats`] and the walk moves on.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Progress could not be recorded, or the manifest was refused as corrupt.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be set up.
    #[error("failed to initialise HTTP client: {0}")]
    Client(#[source] FetchError),
}
