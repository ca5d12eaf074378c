//! Manifest record for one saved leaf.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::naming::sanitize_name;

/// Sample length for a leaf of `declared_size` bytes.
///
/// `clamp(max(min_bytes, ceil(declared_size / percent)), 0, declared_size)`.
/// `percent` is a divisor: 2 samples half the file. A zero divisor is read as 1.
///
/// # Example
///
/// ```
/// use mirror_core::manifest::peek_sample_length;
///
/// assert_eq!(peek_sample_length(1_000_000, 32_768, 2), 500_000);
/// assert_eq!(peek_sample_length(10_000, 32_768, 2), 10_000);
/// ```
#[must_use]
pub fn peek_sample_length(declared_size: u64, min_bytes: u64, percent: u64) -> u64 {
    let share = declared_size.div_ceil(percent.max(1));
    share.max(min_bytes).min(declared_size)
}

/// Durable record of a leaf that has been fully saved.
///
/// Entries are replaced wholesale on supersession and never edited in place.
/// Fields added after the first release carry serde defaults so older logs
/// keep loading; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Directory relative to the mirror root: `""` for the root, else ending in `/`.
    pub directory: String,
    /// Remote leaf name (percent-decoded).
    pub name: String,
    /// Absolute source URL.
    pub source: String,
    /// Byte length the server advertised when the leaf was saved.
    pub declared_size: u64,
    /// Minimum sample size in effect when the digest was taken.
    #[serde(default)]
    pub peek_min_bytes: u64,
    /// Number of leading bytes covered by `content_digest`.
    pub peek_sample_length: u64,
    /// Sample divisor in effect when the digest was taken.
    pub peek_sample_percent: u64,
    /// Lowercase hex SHA-256 of the first `peek_sample_length` bytes.
    pub content_digest: String,
    /// Local file name chosen at save time.
    ///
    /// Computed once by [`crate::naming::NameAllocator::unique_name`] when the
    /// leaf is saved and never recomputed afterwards.
    pub local_name: String,
    /// Whether the leaf was fully saved.
    #[serde(default = "default_saved")]
    pub saved: bool,
}

fn default_saved() -> bool {
    true
}

impl ManifestEntry {
    /// Sample length implied by this entry's own peek configuration.
    #[must_use]
    pub fn sample_length(&self) -> u64 {
        peek_sample_length(
            self.declared_size,
            self.peek_min_bytes,
            self.peek_sample_percent,
        )
    }

    /// Where the saved file lives under `root` for the given layout.
    #[must_use]
    pub fn local_path(&self, root: &Path, flat: bool) -> PathBuf {
        if flat {
            root.join(&self.local_name)
        } else {
            root.join(directory_path(&self.directory))
                .join(&self.local_name)
        }
    }
}

/// Maps a relative branch like `pub/iso/` onto local path segments.
///
/// Segments are percent-decoded and sanitized.
#[must_use]
pub fn directory_path(directory: &str) -> PathBuf {
    directory
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
            sanitize_name(&decoded)
        })
        .collect()
}
