//! HTTP fetching for listings, size probes, bounded samples and downloads.
//!
//! The walker talks to the network only through the [`Fetcher`] trait so the
//! traversal, change detection and manifest logic can be exercised against
//! any transport. [`HttpFetcher`] is the `reqwest`-backed implementation.
//!
//! # Example
//!
//! ```no_run
//! use mirror_core::fetch::{Fetcher, HttpFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new();
//! let html = fetcher.fetch_listing("https://example.com/pub/").await?;
//! let head = fetcher.sample("https://example.com/pub/big.iso", 4096).await?;
//! println!("{} bytes of listing, {} sampled", html.len(), head.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;

use std::path::Path;

use async_trait::async_trait;

pub use client::{FetchOptions, HttpFetcher};
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, READ_TIMEOUT_SECS};
pub use error::FetchError;

/// Outcome of a streamed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Bytes actually received and written.
    pub bytes_written: u64,
    /// Length the server advertised for the body, if any.
    pub declared_size: Option<u64>,
}

impl DownloadReport {
    /// Bytes received beyond the advertised length, when the server overran it.
    #[must_use]
    pub fn overrun(&self) -> Option<u64> {
        self.declared_size
            .filter(|declared| self.bytes_written > *declared)
            .map(|declared| self.bytes_written - declared)
    }
}

/// Network capability consumed by the walker and change detector.
///
/// Implementations must never retry on their own; every call is one attempt.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a directory listing page as text.
    async fn fetch_listing(&self, url: &str) -> Result<String, FetchError>;

    /// Returns the remote leaf's advertised byte length, if the server reports one.
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError>;

    /// Returns at most `limit` leading bytes of the remote leaf.
    ///
    /// Implementations stop reading once `limit` bytes have arrived.
    async fn sample(&self, url: &str, limit: u64) -> Result<Vec<u8>, FetchError>;

    /// Streams the remote leaf into `dest`, creating or truncating it.
    ///
    /// On failure the partially written `dest` is removed.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        chunk_size: usize,
    ) -> Result<DownloadReport, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_report_overrun_detected() {
        let report = DownloadReport {
            bytes_written: 120,
            declared_size: Some(100),
        };
        assert_eq!(report.overrun(), Some(20));
    }

    #[test]
    fn test_download_report_no_overrun_when_short_or_unknown() {
        let short = DownloadReport {
            bytes_written: 80,
            declared_size: Some(100),
        };
        let unknown = DownloadReport {
            bytes_written: 80,
            declared_size: None,
        };
        assert_eq!(short.overrun(), None);
        assert_eq!(unknown.overrun(), None);
    }
}
