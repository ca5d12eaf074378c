//! Post-download archive expansion.
//!
//! Supported shapes, chosen by file extension:
//!
//! | Extension      | Shape                         | Output                          |
//! |----------------|-------------------------------|---------------------------------|
//! | `.gz`, `.tgz`  | gzip stream, all members      | `.gz` stripped, `.tgz` → `.tar` |
//! | `.zip`         | checksummed, multi-member     | members, verified first         |
//! | `.tar`         | unchecksummed, multi-member   | regular-file members only       |
//!
//! Expansion replaces the archive with its contents. A cascade expands the
//! outputs of one archive once more, so `data.tar.gz` ends as the members of
//! `data.tar`, and nothing found inside those members is touched.

mod error;
mod formats;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

pub use error::ArchiveError;
use formats::Placement;

use crate::naming::NameAllocator;

/// Archive shape recognised from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Gzip stream of one or more members (`.gz`, `.tgz`).
    Gzip,
    /// Zip container (`.zip`).
    Zip,
    /// Tar container (`.tar`).
    Tar,
}

impl ArchiveKind {
    /// Classifies `path` by its extension, case-insensitively.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Files left on disk after a successful expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    /// Final outputs, including nested archives that were not expanded.
    pub files: Vec<PathBuf>,
    /// Archives expanded, counting cascaded ones.
    pub archives_expanded: usize,
    /// Cascaded archives that failed and were left in place.
    pub archives_failed: usize,
}

/// Result of [`ArchiveExpander::expand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// The file has no recognised archive extension and was left alone.
    NotArchive,
    /// The archive was replaced by its contents.
    Expanded(ExpansionReport),
}

/// Expands downloaded archives into the directory that holds them.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveExpander {
    names: NameAllocator,
    flat: bool,
}

impl ArchiveExpander {
    /// Creates an expander.
    ///
    /// With `flat`, every member lands directly next to the archive; otherwise
    /// the archive's internal directory layout is recreated.
    #[must_use]
    pub fn new(names: NameAllocator, flat: bool) -> Self {
        Self { names, flat }
    }

    /// Expands `path` in place.
    ///
    /// On success the archive is deleted. With `allow_cascade`, each output is
    /// expanded once more without further cascading; failures there are
    /// counted in the report and leave that output untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the archive cannot be decoded or its output
    /// cannot be written. Partial output is removed and the archive is kept.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn expand(&self, path: &Path, allow_cascade: bool) -> Result<Expansion, ArchiveError> {
        let Some(kind) = ArchiveKind::detect(path) else {
            return Ok(Expansion::NotArchive);
        };
        let target = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let produced = self.expand_one(kind, path, &target)?;
        fs::remove_file(path).map_err(|e| ArchiveError::io(path, e))?;
        info!(
            archive = %path.display(),
            kind = ?kind,
            outputs = produced.len(),
            "archive expanded"
        );

        let mut report = ExpansionReport {
            archives_expanded: 1,
            ..ExpansionReport::default()
        };
        for output in produced {
            if !allow_cascade {
                report.files.push(output);
                continue;
            }
            match self.expand(&output, false) {
                Ok(Expansion::NotArchive) => report.files.push(output),
                Ok(Expansion::Expanded(inner)) => {
                    report.files.extend(inner.files);
                    report.archives_expanded += inner.archives_expanded;
                }
                Err(err) => {
                    warn!(
                        archive = %output.display(),
                        error = %err,
                        "nested archive left unexpanded"
                    );
                    report.archives_failed += 1;
                    report.files.push(output);
                }
            }
        }

        Ok(Expansion::Expanded(report))
    }

    fn expand_one(
        &self,
        kind: ArchiveKind,
        archive: &Path,
        target: &Path,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        let placement = Placement {
            names: self.names,
            flat: self.flat,
        };
        let mut produced = Vec::new();
        let result = match kind {
            ArchiveKind::Gzip => formats::gunzip(archive, target, placement, &mut produced),
            ArchiveKind::Zip => formats::unzip(archive, target, placement, &mut produced),
            ArchiveKind::Tar => formats::untar(archive, target, placement, &mut produced),
        };

        if let Err(err) = result {
            for partial in &produced {
                if let Err(remove_err) = fs::remove_file(partial) {
                    warn!(
                        path = %partial.display(),
                        error = %remove_err,
                        "could not remove partial expansion output"
                    );
                }
            }
            return Err(err);
        }
        Ok(produced)
    }
}
