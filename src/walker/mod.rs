//! Depth-first traversal of a remote directory index.
//!
//! The walker lists one directory at a time, saves new or changed leaves into
//! the mirror, and queues sub-directories on an explicit stack. Failures are
//! scoped: a listing that cannot be fetched abandons only its own subtree,
//! and a leaf that cannot be saved is skipped. Only a manifest that cannot be
//! written stops the run.
//!
//! # Example
//!
//! ```no_run
//! use mirror_core::{Mirror, MirrorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig::new("https://example.com/pub/", "/srv/mirror")?;
//! let stats = Mirror::new(config).run().await?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

mod classify;
mod error;
mod stats;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::WalkError;
pub use stats::WalkStats;

use classify::{Link, SkipReason, classify};

use crate::config::{ConfigError, MirrorConfig};
use crate::detect::{ChangeDetector, Verdict, sample_digest_of_file};
use crate::expand::{ArchiveError, ArchiveExpander, Expansion};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::listing::{HtmlAnchorParser, ListingParser};
use crate::manifest::{
    ManifestEntry, ManifestError, ManifestStore, directory_path, peek_sample_length,
};
use crate::naming::{NameAllocator, sanitize_name};

/// A directory waiting on the work stack.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDirectory {
    branch: String,
    depth: usize,
}

/// Walks a remote index into a local mirror.
#[derive(Debug)]
pub struct Walker<F, P> {
    config: MirrorConfig,
    base: Url,
    fetcher: F,
    parser: P,
    detector: ChangeDetector,
    names: NameAllocator,
    interrupted: Arc<AtomicBool>,
}

impl<F: Fetcher, P: ListingParser> Walker<F, P> {
    /// Creates a walker for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the base URL does not parse.
    pub fn new(config: MirrorConfig, fetcher: F, parser: P) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            detector: ChangeDetector::new(config.sample_failure_verdict),
            names: NameAllocator::new(config.max_extension_segments),
            config,
            base,
            fetcher,
            parser,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares an interruption flag; once set, the walk stops at the next
    /// listing or leaf.
    #[must_use]
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// The fetcher this walker uses.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Visits `branch` and everything below it.
    ///
    /// `branch` is relative to the base URL: `""` for the root, otherwise a
    /// path ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::Manifest`] if progress cannot be persisted.
    #[instrument(skip(self, store), fields(base = %self.base))]
    pub async fn walk(
        &self,
        store: &mut ManifestStore,
        branch: &str,
    ) -> Result<WalkStats, WalkError> {
        let mut stats = WalkStats::default();
        let mut visited = HashSet::new();
        let mut stack = vec![PendingDirectory {
            branch: branch.to_string(),
            depth: branch.matches('/').count(),
        }];

        while let Some(directory) = stack.pop() {
            if self.is_interrupted() {
                stats.interrupted = true;
                break;
            }
            if !visited.insert(directory.branch.clone()) {
                debug!(branch = %directory.branch, "directory already visited");
                continue;
            }

            let children = self.visit_directory(store, &directory, &mut stats).await?;
            store.flush_async().await?;
            if stats.interrupted {
                break;
            }
            // Reversed so the first listed sub-directory is popped first.
            stack.extend(children.into_iter().rev());
        }

        store.flush_async().await?;
        if stats.interrupted {
            warn!(%stats, "walk interrupted");
        } else {
            info!(%stats, "walk complete");
        }
        Ok(stats)
    }

    async fn visit_directory(
        &self,
        store: &mut ManifestStore,
        directory: &PendingDirectory,
        stats: &mut WalkStats,
    ) -> Result<Vec<PendingDirectory>, WalkError> {
        let branch = directory.branch.as_str();
        let url = match self.base.join(branch) {
            Ok(url) => url,
            Err(err) => {
                warn!(branch, error = %err, "cannot build listing URL; skipping branch");
                stats.directories_failed += 1;
                return Ok(Vec::new());
            }
        };

        let html = match self.fetcher.fetch_listing(url.as_str()).await {
            Ok(html) => html,
            Err(err) => {
                warn!(branch, url = %url, error = %err, "listing failed; skipping branch");
                stats.directories_failed += 1;
                return Ok(Vec::new());
            }
        };
        stats.directories_visited += 1;
        info!(branch, depth = directory.depth, "listing directory");

        let mut children = Vec::new();
        for anchor in self.parser.parse(&html) {
            match classify(&self.base, branch, &anchor, self.config.max_depth) {
                Link::Directory { branch: child, depth } => {
                    debug!(branch = %child, depth, "queued sub-directory");
                    children.push(PendingDirectory {
                        branch: child,
                        depth,
                    });
                }
                Link::Leaf { name, source } => {
                    if self.is_interrupted() {
                        stats.interrupted = true;
                        return Ok(Vec::new());
                    }
                    self.visit_leaf(store, branch, &name, &source, stats)
                        .await?;
                }
                Link::Skip(SkipReason::OffSite) => {
                    warn!(branch, href = %anchor.href, "ignoring off-site link");
                    stats.links_skipped += 1;
                }
                Link::Skip(reason) => {
                    debug!(branch, href = %anchor.href, ?reason, "link skipped");
                    stats.links_skipped += 1;
                }
            }
        }

        Ok(children)
    }

    async fn visit_leaf(
        &self,
        store: &mut ManifestStore,
        branch: &str,
        name: &str,
        source: &str,
        stats: &mut WalkStats,
    ) -> Result<(), WalkError> {
        let previous = store.lookup(branch, name).cloned();

        if let Some(previous) = &previous {
            if self.config.assume_unchanged {
                debug!(branch, name, "already mirrored; assumed unchanged");
                stats.leaves_unchanged += 1;
                return Ok(());
            }

            let remote_size = match self.fetcher.probe_size(source).await {
                Ok(size) => size,
                Err(err) => {
                    warn!(url = %source, error = %err, "size probe failed");
                    None
                }
            };
            let verdict = self
                .detector
                .compare(&self.fetcher, previous, remote_size)
                .await;
            if verdict == Verdict::Unchanged {
                debug!(branch, name, "unchanged");
                stats.leaves_unchanged += 1;
                return Ok(());
            }
            info!(branch, name, "changed; downloading again");
        }

        self.save_leaf(store, branch, name, source, previous.as_ref(), stats)
            .await
    }

    fn target_dir(&self, branch: &str) -> PathBuf {
        if self.config.flat {
            self.config.save_dir.clone()
        } else {
            self.config.save_dir.join(directory_path(branch))
        }
    }

    #[instrument(skip(self, store, previous, stats), fields(url = %source))]
    async fn save_leaf(
        &self,
        store: &mut ManifestStore,
        branch: &str,
        name: &str,
        source: &str,
        previous: Option<&ManifestEntry>,
        stats: &mut WalkStats,
    ) -> Result<(), WalkError> {
        let target_dir = self.target_dir(branch);
        if let Err(err) = tokio::fs::create_dir_all(&target_dir).await {
            warn!(path = %target_dir.display(), error = %err, "cannot create directory");
            stats.leaves_failed += 1;
            return Ok(());
        }

        let partial = target_dir.join(format!(".{}.part", sanitize_name(name)));
        let report = match self
            .fetcher
            .download(source, &partial, self.config.chunk_size)
            .await
        {
            Ok(report) => report,
            Err(err) => {
                warn!(url = %source, error = %err, "download failed");
                stats.leaves_failed += 1;
                return Ok(());
            }
        };
        if let Some(extra) = report.overrun() {
            warn!(
                url = %source,
                declared = ?report.declared_size,
                received = report.bytes_written,
                extra,
                "server sent more bytes than advertised; keeping all of them"
            );
            stats.size_overruns += 1;
        }

        let local_name = self.final_name(&target_dir, name, previous);
        let local_path = target_dir.join(&local_name);
        if let Err(err) = tokio::fs::rename(&partial, &local_path).await {
            warn!(path = %local_path.display(), error = %err, "cannot move download into place");
            let _ = tokio::fs::remove_file(&partial).await;
            stats.leaves_failed += 1;
            return Ok(());
        }

        let declared_size = report.declared_size.unwrap_or(report.bytes_written);
        let sample_length = peek_sample_length(
            declared_size,
            self.config.peek_min_bytes,
            self.config.peek_percent,
        );
        let digest_path = local_path.clone();
        let digest = tokio::task::spawn_blocking(move || {
            sample_digest_of_file(&digest_path, sample_length)
        })
        .await
        .unwrap_or_else(|join| Err(std::io::Error::other(join)));
        let content_digest = match digest {
            Ok(digest) => digest,
            Err(err) => {
                warn!(path = %local_path.display(), error = %err, "cannot digest saved file");
                stats.leaves_failed += 1;
                return Ok(());
            }
        };

        let entry = ManifestEntry {
            directory: branch.to_string(),
            name: name.to_string(),
            source: source.to_string(),
            declared_size,
            peek_min_bytes: self.config.peek_min_bytes,
            peek_sample_length: sample_length,
            peek_sample_percent: self.config.peek_percent,
            content_digest,
            local_name,
            saved: true,
        };
        match previous {
            Some(old) => store.supersede(old, entry)?,
            None => store.upsert(entry)?,
        }
        stats.leaves_downloaded += 1;
        info!(
            path = %local_path.display(),
            bytes = report.bytes_written,
            "saved"
        );

        if self.config.expand {
            self.expand_saved(&local_path, stats).await;
        }
        Ok(())
    }

    /// Local name for a fresh download. A superseded file is overwritten in
    /// place only when the delete policy would remove it anyway.
    fn final_name(&self, target_dir: &Path, name: &str, previous: Option<&ManifestEntry>) -> String {
        if self.config.delete_superseded
            && let Some(old) = previous
        {
            let old_path = old.local_path(&self.config.save_dir, self.config.flat);
            if old_path.parent() == Some(target_dir) {
                return old.local_name.clone();
            }
        }
        self.names.unique_name(target_dir, name)
    }

    async fn expand_saved(&self, path: &Path, stats: &mut WalkStats) {
        let expander = ArchiveExpander::new(self.names, self.config.flat);
        let archive = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || expander.expand(&archive, true))
            .await
            .map_err(|e| ArchiveError::join(path, e))
            .and_then(std::convert::identity);

        match result {
            Ok(Expansion::NotArchive) => {}
            Ok(Expansion::Expanded(report)) => {
                stats.archives_expanded += report.archives_expanded;
                stats.archives_failed += report.archives_failed;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "archive left unexpanded");
                stats.archives_failed += 1;
            }
        }
    }
}

/// One complete mirror run: open the manifest, walk, compact.
#[derive(Debug, Clone)]
pub struct Mirror {
    config: MirrorConfig,
    interrupted: Arc<AtomicBool>,
}

impl Mirror {
    /// Creates a run for `config`.
    #[must_use]
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an interruption flag with the caller (typically a Ctrl-C handler).
    #[must_use]
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// The configuration this run uses.
    #[must_use]
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Runs the mirror over HTTP with the default listing parser.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError`] for invalid configuration, a client that cannot
    /// be built, or a manifest that cannot be read or written.
    pub async fn run(&self) -> Result<WalkStats, WalkError> {
        self.config.validate()?;
        let fetcher =
            HttpFetcher::with_options(self.config.fetch_options()).map_err(WalkError::Client)?;
        self.run_with(fetcher, HtmlAnchorParser).await
    }

    /// Runs the mirror with an explicit fetcher and parser.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    #[instrument(skip(self, fetcher, parser), fields(base = %self.config.base_url))]
    pub async fn run_with<F: Fetcher, P: ListingParser>(
        &self,
        fetcher: F,
        parser: P,
    ) -> Result<WalkStats, WalkError> {
        let walker = Walker::new(self.config.clone(), fetcher, parser)?
            .with_interrupt_flag(Arc::clone(&self.interrupted));
        let options = self.config.manifest_options();
        let manifest_path = options.path.clone();
        let mut store =
            on_blocking_pool(&manifest_path, move || ManifestStore::open(options)).await?;

        let stats = walker.walk(&mut store, "").await?;
        if stats.interrupted {
            info!("manifest left uncompacted after interruption");
        } else {
            on_blocking_pool(&manifest_path, move || store.finalize()).await?;
        }
        Ok(stats)
    }
}

/// Runs whole-file manifest work off the async worker threads.
async fn on_blocking_pool<T, W>(path: &Path, work: W) -> Result<T, ManifestError>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T, ManifestError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join| ManifestError::io(path, std::io::Error::other(join)))?
}
