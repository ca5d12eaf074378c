//! Sampled-digest change detection.
//!
//! A leaf counts as unchanged when its advertised size matches the manifest
//! and a SHA-256 over its first `peek_sample_length` bytes matches the
//! recorded digest. Leaves that differ only after the sampled prefix are
//! reported unchanged.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::fetch::Fetcher;
use crate::manifest::ManifestEntry;

/// Whether a remote leaf needs to be downloaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Same size and same sampled digest.
    Unchanged,
    /// Different size, different digest, or undecidable.
    #[default]
    Changed,
}

/// Compares a remote leaf against its manifest entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    fallback: Verdict,
}

impl ChangeDetector {
    /// Creates a detector that answers `fallback` whenever it cannot decide.
    #[must_use]
    pub fn new(fallback: Verdict) -> Self {
        Self { fallback }
    }

    /// Decides whether `previous` still describes the remote leaf.
    ///
    /// A size mismatch is decided without any network read. Otherwise exactly
    /// `previous.sample_length()` leading bytes are fetched and digested.
    #[instrument(skip(self, fetcher, previous), fields(url = %previous.source))]
    pub async fn compare(
        &self,
        fetcher: &dyn Fetcher,
        previous: &ManifestEntry,
        remote_size: Option<u64>,
    ) -> Verdict {
        let Some(remote_size) = remote_size else {
            warn!(
                url = %previous.source,
                verdict = ?self.fallback,
                "remote size unknown; using fallback verdict"
            );
            return self.fallback;
        };

        if remote_size != previous.declared_size {
            debug!(
                previous = previous.declared_size,
                remote = remote_size,
                "size changed"
            );
            return Verdict::Changed;
        }

        let limit = previous.sample_length();
        let sample = match fetcher.sample(&previous.source, limit).await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(
                    url = %previous.source,
                    error = %err,
                    verdict = ?self.fallback,
                    "sampling failed; using fallback verdict"
                );
                return self.fallback;
            }
        };

        let digest = hex_digest(&sample);
        if digest == previous.content_digest {
            debug!(sampled = sample.len(), "sampled digest matches");
            Verdict::Unchanged
        } else {
            debug!(sampled = sample.len(), "sampled digest differs");
            Verdict::Changed
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of the first `len` bytes of a local file.
///
/// Produces the same digest [`ChangeDetector::compare`] computes over a
/// remote sample of the same bytes.
///
/// # Errors
///
/// Returns the IO error if the file cannot be opened or read.
pub fn sample_digest_of_file(path: &Path, len: u64) -> io::Result<String> {
    let mut reader = File::open(path)?.take(len);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::fetch::{DownloadReport, FetchError};

    struct StubFetcher {
        body: Vec<u8>,
        fail_sample: bool,
        sample_calls: AtomicUsize,
        last_limit: AtomicUsize,
    }

    impl StubFetcher {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                fail_sample: false,
                sample_calls: AtomicUsize::new(0),
                last_limit: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch_listing(&self, _url: &str) -> Result<String, FetchError> {
            Ok(String::new())
        }

        async fn probe_size(&self, _url: &str) -> Result<Option<u64>, FetchError> {
            Ok(Some(self.body.len() as u64))
        }

        async fn sample(&self, url: &str, limit: u64) -> Result<Vec<u8>, FetchError> {
            self.sample_calls.fetch_add(1, Ordering::SeqCst);
            self.last_limit
                .store(usize::try_from(limit).unwrap(), Ordering::SeqCst);
            if self.fail_sample {
                return Err(FetchError::http_status(url, 500));
            }
            let end = usize::try_from(limit).unwrap().min(self.body.len());
            Ok(self.body[..end].to_vec())
        }

        async fn download(
            &self,
            _url: &str,
            _dest: &Path,
            _chunk_size: usize,
        ) -> Result<DownloadReport, FetchError> {
            unreachable!("detector never downloads")
        }
    }

    fn entry_for(body: &[u8], min: u64, percent: u64) -> ManifestEntry {
        let declared_size = body.len() as u64;
        let sample_length = crate::manifest::peek_sample_length(declared_size, min, percent);
        let end = usize::try_from(sample_length).unwrap();
        ManifestEntry {
            directory: String::new(),
            name: "leaf.bin".into(),
            source: "https://example.com/leaf.bin".into(),
            declared_size,
            peek_min_bytes: min,
            peek_sample_length: sample_length,
            peek_sample_percent: percent,
            content_digest: hex_digest(&body[..end]),
            local_name: "leaf.bin".into(),
            saved: true,
        }
    }

    #[test]
    fn test_hex_digest_known_value() {
        assert_eq!(
            hex_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sample_digest_of_file_matches_prefix_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(sample_digest_of_file(&path, 5).unwrap(), hex_digest(b"hello"));
        assert_eq!(
            sample_digest_of_file(&path, 1_000).unwrap(),
            hex_digest(b"hello world")
        );
    }

    #[tokio::test]
    async fn test_size_change_is_changed_without_sampling() {
        let body = vec![1u8; 100];
        let fetcher = StubFetcher::new(&body);
        let previous = entry_for(&body, 0, 2);

        let verdict = ChangeDetector::default()
            .compare(&fetcher, &previous, Some(101))
            .await;

        assert_eq!(verdict, Verdict::Changed);
        assert_eq!(fetcher.sample_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_matching_sample_is_unchanged_and_reads_exact_length() {
        let body: Vec<u8> = (0..=255u8).cycle().take(1_000).collect();
        let fetcher = StubFetcher::new(&body);
        let previous = entry_for(&body, 10, 4);

        let verdict = ChangeDetector::default()
            .compare(&fetcher, &previous, Some(1_000))
            .await;

        assert_eq!(verdict, Verdict::Unchanged);
        assert_eq!(fetcher.sample_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.last_limit.load(Ordering::SeqCst), 250);
    }

    #[tokio::test]
    async fn test_differing_prefix_is_changed() {
        let old = vec![1u8; 100];
        let mut new = old.clone();
        new[0] = 2;
        let fetcher = StubFetcher::new(&new);

        let verdict = ChangeDetector::default()
            .compare(&fetcher, &entry_for(&old, 0, 2), Some(100))
            .await;

        assert_eq!(verdict, Verdict::Changed);
    }

    #[tokio::test]
    async fn test_difference_past_sample_goes_unnoticed() {
        let old = vec![1u8; 100];
        let mut new = old.clone();
        new[99] = 2;
        let fetcher = StubFetcher::new(&new);

        let verdict = ChangeDetector::default()
            .compare(&fetcher, &entry_for(&old, 0, 2), Some(100))
            .await;

        assert_eq!(verdict, Verdict::Unchanged);
    }

    #[tokio::test]
    async fn test_sample_failure_uses_fallback() {
        let body = vec![1u8; 100];
        let mut fetcher = StubFetcher::new(&body);
        fetcher.fail_sample = true;
        let previous = entry_for(&body, 0, 2);

        let changed = ChangeDetector::default()
            .compare(&fetcher, &previous, Some(100))
            .await;
        let unchanged = ChangeDetector::new(Verdict::Unchanged)
            .compare(&fetcher, &previous, Some(100))
            .await;

        assert_eq!(changed, Verdict::Changed);
        assert_eq!(unchanged, Verdict::Unchanged);
    }

    #[tokio::test]
    async fn test_unknown_size_uses_fallback() {
        let body = vec![1u8; 100];
        let fetcher = StubFetcher::new(&body);
        let previous = entry_for(&body, 0, 2);

        let verdict = ChangeDetector::default()
            .compare(&fetcher, &previous, None)
            .await;

        assert_eq!(verdict, Verdict::Changed);
        assert_eq!(fetcher.sample_calls.load(Ordering::SeqCst), 0);
    }
}
