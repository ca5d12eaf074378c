//! `reqwest`-backed [`Fetcher`] implementation.
//!
//! One client is built per run and reused for every request so connections
//! are pooled. Listings are requested with compression allowed; probes,
//! samples and downloads ask for the identity encoding so the bytes that are
//! sampled and digested are the bytes of the file itself.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::FetchError;
use super::{DownloadReport, Fetcher};
use crate::user_agent;

/// Upper bound on the buffer reserved up front for a sample.
const SAMPLE_PREALLOC_LIMIT: usize = 1024 * 1024;

/// Transport settings for [`HttpFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            accept_invalid_certs: false,
        }
    }
}

/// HTTP fetcher for directory listings and leaf transfers.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Creates a fetcher with default timeouts and certificate checks enabled.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static default
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_options(FetchOptions::default())
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a fetcher from explicit transport options.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the client cannot be built.
    pub fn with_options(options: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
            .timeout(Duration::from_secs(options.read_timeout_secs))
            .gzip(true)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .user_agent(user_agent::default_mirror_user_agent())
            .build()
            .map_err(|source| FetchError::ClientBuild { source })?;
        Ok(Self { client })
    }

    fn identity_get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).header(ACCEPT_ENCODING, "identity")
    }

    async fn dispatch(&self, request: RequestBuilder, url: &str) -> Result<Response, FetchError> {
        reqwest::Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        request
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, FetchError> {
        let response = self.dispatch(request, url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_listing(&self, url: &str) -> Result<String, FetchError> {
        let response = self.send(self.client.get(url), url).await?;
        response.text().await.map_err(|e| FetchError::network(url, e))
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError> {
        // A one-byte range answers with the full length in Content-Range;
        // servers that ignore ranges report it in Content-Length instead.
        // An empty leaf cannot satisfy the range and answers 416 `bytes */0`.
        let response = self
            .dispatch(self.identity_get(url).header(RANGE, "bytes=0-0"), url)
            .await?;
        let status = response.status();
        let size = if status == StatusCode::PARTIAL_CONTENT {
            total_from_content_range(&response)
        } else if status == StatusCode::RANGE_NOT_SATISFIABLE {
            let total = total_from_content_range(&response);
            if total.is_none() {
                return Err(FetchError::http_status(url, status.as_u16()));
            }
            total
        } else if status.is_success() {
            header_content_length(&response)
        } else {
            return Err(FetchError::http_status(url, status.as_u16()));
        };
        debug!(size = ?size, "probed remote size");
        Ok(size)
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn sample(&self, url: &str, limit: u64) -> Result<Vec<u8>, FetchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let range = format!("bytes=0-{}", limit - 1);
        let response = self
            .send(self.identity_get(url).header(RANGE, range), url)
            .await?;

        let reserve = usize::try_from(limit)
            .unwrap_or(usize::MAX)
            .min(SAMPLE_PREALLOC_LIMIT);
        let mut sample = Vec::with_capacity(reserve);
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
            let remaining = limit - sample.len() as u64;
            let take = usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(chunk.len());
            sample.extend_from_slice(&chunk[..take]);
            if sample.len() as u64 >= limit {
                break;
            }
        }
        // Dropping the stream here closes the connection instead of draining it.
        drop(stream);

        debug!(bytes = sample.len(), "sample complete");
        Ok(sample)
    }

    #[instrument(skip(self, dest), fields(url = %url, path = %dest.display()))]
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        chunk_size: usize,
    ) -> Result<DownloadReport, FetchError> {
        let response = self.send(self.identity_get(url), url).await?;
        let declared_size = header_content_length(&response);

        let file = File::create(dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;

        let stream_result = stream_to_file(file, response, url, dest, chunk_size).await;
        if stream_result.is_err() {
            debug!(path = %dest.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(dest).await;
        }
        let bytes_written = stream_result?;

        Ok(DownloadReport {
            bytes_written,
            declared_size,
        })
    }
}

/// Streams response body to file, returning bytes written.
///
/// Every received byte is written, even past the advertised length.
async fn stream_to_file(
    file: File,
    response: Response,
    url: &str,
    dest: &Path,
    chunk_size: usize,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(dest, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| FetchError::io(dest, e))?;
    Ok(bytes_written)
}

fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn total_from_content_range(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

/// Parses the complete length out of `bytes 0-0/1234` or `bytes */0`; a `*`
/// total means unknown.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}
