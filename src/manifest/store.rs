//! Append-only manifest log with an in-memory live index.
//!
//! # On-disk format
//!
//! JSON Lines. Each line is one self-delimited record:
//!
//! ```text
//! {"op":"upsert","directory":"pub/","name":"a.txt",...}
//! {"op":"retire","directory":"pub/","name":"a.txt"}
//! ```
//!
//! A bare entry object without `op` is read as an upsert. The loader also
//! accepts the older comma-joined shape (leading `[`, trailing `]`, trailing
//! commas, several records on one line). [`ManifestStore::finalize`]
//! rewrites the log as one upsert per live entry, sorted by directory and name.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::entry::ManifestEntry;
use super::error::ManifestError;

/// File name of the manifest inside the save directory.
pub const MANIFEST_FILE_NAME: &str = ".manifest";

/// What to do when the persisted log cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptManifestPolicy {
    /// Move the unreadable file aside and start with an empty manifest.
    #[default]
    Quarantine,
    /// Refuse to continue.
    Abort,
}

/// Settings for a [`ManifestStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestOptions {
    /// Location of the log file.
    pub path: PathBuf,
    /// Mirror root that entries' local paths are relative to.
    pub save_root: PathBuf,
    /// Whether saved files live directly in `save_root`.
    pub flat: bool,
    /// Delete a superseded entry's file from disk.
    pub delete_superseded: bool,
    /// Handling of an unreadable log at load time.
    pub corrupt_policy: CorruptManifestPolicy,
}

impl ManifestOptions {
    /// Options for a manifest stored as `.manifest` inside `save_root`.
    #[must_use]
    pub fn for_save_dir(save_root: impl Into<PathBuf>) -> Self {
        let save_root = save_root.into();
        Self {
            path: save_root.join(MANIFEST_FILE_NAME),
            save_root,
            flat: false,
            delete_superseded: false,
            corrupt_policy: CorruptManifestPolicy::default(),
        }
    }
}

/// Result of [`ManifestStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No log exists yet.
    Missing,
    /// The log was replayed.
    Loaded {
        /// Records replayed.
        records: usize,
        /// Live entries after replay.
        live: usize,
        /// An incomplete final record was dropped and the file truncated.
        torn_tail: bool,
    },
    /// The log was unreadable and has been moved aside.
    Quarantined {
        /// Where the unreadable file now lives.
        moved_to: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RecordOut<'a> {
    Upsert(&'a ManifestEntry),
    Retire { directory: &'a str, name: &'a str },
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum TaggedRecord {
    Upsert(ManifestEntry),
    Retire { directory: String, name: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordIn {
    Tagged(TaggedRecord),
    Bare(ManifestEntry),
}

/// Durable set of saved leaves, keyed by (directory, name).
///
/// At most one live entry exists per key. All mutations are appended to the
/// log before the in-memory index changes; [`flush`](Self::flush) makes
/// them durable.
#[derive(Debug)]
pub struct ManifestStore {
    options: ManifestOptions,
    entries: BTreeMap<String, BTreeMap<String, ManifestEntry>>,
    sources: HashMap<String, (String, String)>,
    log: Option<File>,
    unsynced: bool,
    needs_newline: bool,
}

impl ManifestStore {
    /// Creates an empty store without touching the disk.
    #[must_use]
    pub fn new(options: ManifestOptions) -> Self {
        Self {
            options,
            entries: BTreeMap::new(),
            sources: HashMap::new(),
            log: None,
            unsynced: false,
            needs_newline: false,
        }
    }

    /// Creates a store and loads the persisted log.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Corrupt`] under [`CorruptManifestPolicy::Abort`],
    /// or [`ManifestError::Io`] when the log cannot be read or quarantined.
    pub fn open(options: ManifestOptions) -> Result<Self, ManifestError> {
        let mut store = Self::new(options);
        match store.load()? {
            LoadOutcome::Missing => info!(
                path = %store.options.path.display(),
                "no manifest yet; starting fresh"
            ),
            LoadOutcome::Loaded { records, live, .. } => info!(
                path = %store.options.path.display(),
                records,
                live,
                "manifest loaded"
            ),
            LoadOutcome::Quarantined { .. } => {}
        }
        Ok(store)
    }

    /// Replaces the in-memory index with the contents of the persisted log.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    #[instrument(skip(self), fields(path = %self.options.path.display()))]
    pub fn load(&mut self) -> Result<LoadOutcome, ManifestError> {
        self.entries.clear();
        self.sources.clear();
        self.log = None;
        self.unsynced = false;
        self.needs_newline = false;

        let path = self.options.path.clone();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(err) => return Err(ManifestError::io(path, err)),
        };

        let mut records = 0;
        let mut torn_tail = false;
        let mut offset = 0usize;

        for (index, raw) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
            let line_start = offset;
            offset += raw.len();

            match parse_line(raw) {
                Ok(parsed) => {
                    records += parsed.len();
                    for record in parsed {
                        self.replay(record);
                    }
                }
                Err(err) if !raw.ends_with(b"\n") => {
                    warn!(
                        line = index + 1,
                        error = %err,
                        "dropping incomplete trailing manifest record"
                    );
                    truncate_log(&path, line_start as u64)?;
                    torn_tail = true;
                }
                Err(err) => return self.handle_corruption(index + 1, err),
            }
        }

        self.needs_newline = !torn_tail && !bytes.is_empty() && !bytes.ends_with(b"\n");

        Ok(LoadOutcome::Loaded {
            records,
            live: self.len(),
            torn_tail,
        })
    }

    fn handle_corruption(
        &mut self,
        line: usize,
        source: serde_json::Error,
    ) -> Result<LoadOutcome, ManifestError> {
        self.entries.clear();
        self.sources.clear();
        let path = self.options.path.clone();

        match self.options.corrupt_policy {
            CorruptManifestPolicy::Abort => {
                error!(
                    path = %path.display(),
                    line,
                    error = %source,
                    "manifest is corrupt; refusing to continue"
                );
                Err(ManifestError::Corrupt { path, line, source })
            }
            CorruptManifestPolicy::Quarantine => {
                let moved_to = quarantine_path(&path);
                fs::rename(&path, &moved_to).map_err(|e| ManifestError::io(&path, e))?;
                error!(
                    path = %path.display(),
                    moved_to = %moved_to.display(),
                    line,
                    error = %source,
                    "manifest is corrupt; quarantined it and starting with an empty manifest"
                );
                Ok(LoadOutcome::Quarantined { moved_to })
            }
        }
    }

    fn replay(&mut self, record: RecordIn) {
        match record {
            RecordIn::Tagged(TaggedRecord::Upsert(entry)) | RecordIn::Bare(entry) => {
                self.insert_live(entry);
            }
            RecordIn::Tagged(TaggedRecord::Retire { directory, name }) => {
                self.remove_live(&directory, &name);
            }
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All live entries, ordered by directory then name.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values().flat_map(BTreeMap::values)
    }

    /// The live entry for one (directory, name) key.
    #[must_use]
    pub fn lookup(&self, directory: &str, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(directory)?.get(name)
    }

    /// The live entries of one directory.
    pub fn lookup_by_directory(&self, directory: &str) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .get(directory)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    /// The live entry recorded for an exact source URL.
    #[must_use]
    pub fn lookup_by_source(&self, url: &str) -> Option<&ManifestEntry> {
        let (directory, name) = self.sources.get(url)?;
        self.lookup(directory, name)
    }

    /// Appends `entry` to the log and makes it the live entry for its key.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the record cannot be written.
    pub fn upsert(&mut self, entry: ManifestEntry) -> Result<(), ManifestError> {
        self.append(&RecordOut::Upsert(&entry))?;
        debug!(
            directory = %entry.directory,
            name = %entry.name,
            local_name = %entry.local_name,
            "manifest entry recorded"
        );
        self.insert_live(entry);
        Ok(())
    }

    /// Retires `old` and records `new` in its place.
    ///
    /// With the delete policy active, the file `old` names is removed unless
    /// `new` occupies the same path.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if either record cannot be written.
    pub fn supersede(
        &mut self,
        old: &ManifestEntry,
        new: ManifestEntry,
    ) -> Result<(), ManifestError> {
        self.append(&RecordOut::Retire {
            directory: &old.directory,
            name: &old.name,
        })?;
        self.remove_live(&old.directory, &old.name);

        if self.options.delete_superseded {
            self.delete_superseded_file(old, &new);
        }

        self.upsert(new)
    }

    fn delete_superseded_file(&self, old: &ManifestEntry, new: &ManifestEntry) {
        let root = &self.options.save_root;
        let old_path = old.local_path(root, self.options.flat);
        if old_path == new.local_path(root, self.options.flat) {
            debug!(path = %old_path.display(), "replacement reuses superseded path");
            return;
        }
        match fs::remove_file(&old_path) {
            Ok(()) => info!(path = %old_path.display(), "deleted superseded file"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %old_path.display(), "superseded file already gone");
            }
            Err(err) => warn!(
                path = %old_path.display(),
                error = %err,
                "could not delete superseded file"
            ),
        }
    }

    /// Makes every appended record durable.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the log cannot be synced.
    pub fn flush(&mut self) -> Result<(), ManifestError> {
        if !self.unsynced {
            return Ok(());
        }
        if let Some(log) = &self.log {
            log.sync_data()
                .map_err(|e| ManifestError::io(&self.options.path, e))?;
        }
        self.unsynced = false;
        Ok(())
    }

    /// Like [`flush`](Self::flush), with the disk sync run on the blocking
    /// thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the log cannot be synced.
    pub async fn flush_async(&mut self) -> Result<(), ManifestError> {
        if !self.unsynced {
            return Ok(());
        }
        if let Some(log) = &self.log {
            let path = self.options.path.clone();
            let handle = log.try_clone().map_err(|e| ManifestError::io(&path, e))?;
            tokio::task::spawn_blocking(move || handle.sync_data())
                .await
                .map_err(std::io::Error::other)
                .and_then(|synced| synced)
                .map_err(|e| ManifestError::io(path, e))?;
        }
        self.unsynced = false;
        Ok(())
    }

    /// Rewrites the log as a compact snapshot of the live entries.
    ///
    /// Returns `false` without touching the file when it already holds exactly
    /// that snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the snapshot cannot be written or renamed.
    #[instrument(skip(self), fields(path = %self.options.path.display()))]
    pub fn finalize(&mut self) -> Result<bool, ManifestError> {
        self.flush()?;

        let path = self.options.path.clone();
        let snapshot = self.snapshot()?;
        let current = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(ManifestError::io(path, err)),
        };
        let already_compact = current.map_or(snapshot.is_empty(), |bytes| bytes == snapshot);
        if already_compact {
            debug!("manifest already compact");
            return Ok(false);
        }

        self.log = None;
        let temp = temp_path(&path);
        {
            let mut file = File::create(&temp).map_err(|e| ManifestError::io(&temp, e))?;
            file.write_all(&snapshot)
                .map_err(|e| ManifestError::io(&temp, e))?;
            file.sync_all().map_err(|e| ManifestError::io(&temp, e))?;
        }
        fs::rename(&temp, &path).map_err(|e| ManifestError::io(&path, e))?;
        self.needs_newline = false;

        info!(entries = self.len(), "manifest compacted");
        Ok(true)
    }

    fn snapshot(&self) -> Result<Vec<u8>, ManifestError> {
        let mut out = Vec::new();
        for entry in self.iter() {
            serde_json::to_writer(&mut out, &RecordOut::Upsert(entry))?;
            out.push(b'\n');
        }
        Ok(out)
    }

    fn append(&mut self, record: &RecordOut<'_>) -> Result<(), ManifestError> {
        let mut line = Vec::with_capacity(256);
        if self.needs_newline {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, record)?;
        line.push(b'\n');

        let path = &self.options.path;
        if self.log.is_none() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ManifestError::io(path, e))?;
            self.log = Some(file);
        }
        if let Some(log) = self.log.as_mut() {
            log.write_all(&line)
                .map_err(|e| ManifestError::io(path, e))?;
        }

        self.needs_newline = false;
        self.unsynced = true;
        Ok(())
    }

    fn insert_live(&mut self, entry: ManifestEntry) {
        if let Some(previous) = self.lookup(&entry.directory, &entry.name) {
            let stale_source = previous.source.clone();
            self.sources.remove(&stale_source);
        }
        self.sources.insert(
            entry.source.clone(),
            (entry.directory.clone(), entry.name.clone()),
        );
        self.entries
            .entry(entry.directory.clone())
            .or_default()
            .insert(entry.name.clone(), entry);
    }

    fn remove_live(&mut self, directory: &str, name: &str) -> Option<ManifestEntry> {
        let names = self.entries.get_mut(directory)?;
        let removed = names.remove(name)?;
        if names.is_empty() {
            self.entries.remove(directory);
        }
        if self
            .sources
            .get(&removed.source)
            .is_some_and(|(d, n)| d == directory && n == name)
        {
            self.sources.remove(&removed.source);
        }
        Some(removed)
    }
}

/// Parses one physical line, tolerating the comma-joined legacy shape.
fn parse_line(raw: &[u8]) -> Result<Vec<RecordIn>, serde_json::Error> {
    let mut body = raw.trim_ascii();
    if let Some(rest) = body.strip_prefix(b"[") {
        body = rest.trim_ascii();
    }
    if let Some(rest) = body.strip_suffix(b"]") {
        body = rest.trim_ascii();
    }
    if let Some(rest) = body.strip_suffix(b",") {
        body = rest.trim_ascii();
    }
    if body.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_slice::<RecordIn>(body) {
        Ok(record) => Ok(vec![record]),
        Err(first) => {
            // Several records joined by commas on one line.
            let mut wrapped = Vec::with_capacity(body.len() + 2);
            wrapped.push(b'[');
            wrapped.extend_from_slice(body);
            wrapped.push(b']');
            serde_json::from_slice::<Vec<RecordIn>>(&wrapped).map_err(|_| first)
        }
    }
}

fn truncate_log(path: &Path, len: u64) -> Result<(), ManifestError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ManifestError::io(path, e))?;
    file.set_len(len).map_err(|e| ManifestError::io(path, e))
}

fn quarantine_path(path: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let file_name = path
        .file_name()
        .map_or_else(|| MANIFEST_FILE_NAME.into(), |n| n.to_string_lossy().into_owned());

    let mut candidate = path.with_file_name(format!("{file_name}.corrupt-{secs}"));
    let mut attempt = 0u32;
    while candidate.exists() {
        attempt += 1;
        candidate = path.with_file_name(format!("{file_name}.corrupt-{secs}-{attempt}"));
    }
    candidate
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| MANIFEST_FILE_NAME.into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!("{file_name}.tmp"))
}
