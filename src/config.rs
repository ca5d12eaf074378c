//! Run configuration for a mirror.

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::detect::Verdict;
use crate::fetch::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, FetchOptions, READ_TIMEOUT_SECS};
use crate::manifest::{CorruptManifestPolicy, MANIFEST_FILE_NAME, ManifestOptions};
use crate::naming::DEFAULT_MAX_EXTENSION_SEGMENTS;

/// Default minimum number of bytes sampled for change detection.
pub const DEFAULT_PEEK_MIN_BYTES: u64 = 32_768;

/// Default sample divisor: the sample covers `size / 2` bytes.
pub const DEFAULT_PEEK_PERCENT: u64 = 2;

/// Smallest accepted transfer chunk.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Largest accepted transfer chunk.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Largest accepted number of compound extension segments.
pub const MAX_EXTENSION_SEGMENTS: usize = 4;

/// Errors found while validating a [`MirrorConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The base URL could not be parsed or is not http(s).
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The URL as given.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A numeric setting is outside its accepted range.
    #[error("{setting} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Setting name as shown on the command line.
        setting: &'static str,
        /// Value supplied.
        value: u64,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
    },
}

/// Everything one mirror run needs to know.
///
/// # Example
///
/// ```
/// use mirror_core::MirrorConfig;
///
/// let config = MirrorConfig::new("example.com/pub", "/srv/mirror").unwrap();
/// assert_eq!(config.base_url, "https://example.com/pub/");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Root listing URL, always ending in `/`.
    pub base_url: String,
    /// Local directory the mirror is written to.
    pub save_dir: PathBuf,
    /// Deepest directory level visited; 0 means unbounded.
    pub max_depth: usize,
    /// Write buffer size for downloads.
    pub chunk_size: usize,
    /// Minimum sample length for change detection.
    pub peek_min_bytes: u64,
    /// Sample divisor for change detection.
    pub peek_percent: u64,
    /// Expand downloaded archives.
    pub expand: bool,
    /// Save every file directly in `save_dir`.
    pub flat: bool,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Treat leaves already in the manifest as unchanged without checking.
    pub assume_unchanged: bool,
    /// Delete files whose manifest entry has been superseded.
    pub delete_superseded: bool,
    /// Handling of an unreadable manifest.
    pub corrupt_policy: CorruptManifestPolicy,
    /// Verdict used when a leaf's size or sample cannot be obtained.
    pub sample_failure_verdict: Verdict,
    /// Trailing `.segment` tokens kept together when renaming.
    pub max_extension_segments: usize,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
}

impl MirrorConfig {
    /// Creates a configuration with defaults for everything but the two
    /// required locations.
    ///
    /// A URL without a scheme gets `https://`, and a trailing `/` is added.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL cannot be parsed.
    pub fn new(base_url: &str, save_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            save_dir: save_dir.into(),
            max_depth: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            peek_min_bytes: DEFAULT_PEEK_MIN_BYTES,
            peek_percent: DEFAULT_PEEK_PERCENT,
            expand: false,
            flat: false,
            insecure: false,
            assume_unchanged: false,
            delete_superseded: false,
            corrupt_policy: CorruptManifestPolicy::default(),
            sample_failure_verdict: Verdict::Changed,
            max_extension_segments: DEFAULT_MAX_EXTENSION_SEGMENTS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        })
    }

    /// Checks that every setting is in range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_base_url(&self.base_url)?;
        check_range(
            "--chunk-size",
            self.chunk_size as u64,
            MIN_CHUNK_SIZE as u64,
            MAX_CHUNK_SIZE as u64,
        )?;
        check_range("--peek-percent", self.peek_percent, 1, 100)?;
        check_range(
            "max extension segments",
            self.max_extension_segments as u64,
            1,
            MAX_EXTENSION_SEGMENTS as u64,
        )?;
        Ok(())
    }

    /// Location of the manifest log.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.save_dir.join(MANIFEST_FILE_NAME)
    }

    /// Manifest settings implied by this configuration.
    #[must_use]
    pub fn manifest_options(&self) -> ManifestOptions {
        ManifestOptions {
            path: self.manifest_path(),
            save_root: self.save_dir.clone(),
            flat: self.flat,
            delete_superseded: self.delete_superseded,
            corrupt_policy: self.corrupt_policy,
        }
    }

    /// Transport settings implied by this configuration.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            connect_timeout_secs: self.connect_timeout_secs,
            read_timeout_secs: self.read_timeout_secs,
            accept_invalid_certs: self.insecure,
        }
    }
}

fn check_range(setting: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            setting,
            value,
            min,
            max,
        })
    }
}

/// Prepends `https://` when no scheme is given and forces a trailing `/`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBaseUrl`] for unparsable or non-http(s) URLs.
pub fn normalize_base_url(input: &str) -> Result<String, ConfigError> {
    let trimmed = input.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: input.to_string(),
        reason,
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.into())
}
