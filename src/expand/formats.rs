//! Per-format decoders.
//!
//! Each function writes into `target` and records every file it creates in
//! `produced`, so the caller can remove partial output on failure.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::error::ArchiveError;
use crate::naming::{NameAllocator, sanitize_name};

/// Where an extracted member goes.
#[derive(Debug, Clone, Copy)]
pub(super) struct Placement {
    pub names: NameAllocator,
    pub flat: bool,
}

impl Placement {
    /// Chooses a free output path for a member stored under `member` inside
    /// the archive. Returns `None` for paths that would leave `target`.
    fn output_path(&self, target: &Path, member: &Path) -> Result<Option<PathBuf>, ArchiveError> {
        let mut segments = Vec::new();
        for component in member.components() {
            match component {
                Component::Normal(segment) => segments.push(sanitize_name(&segment.to_string_lossy())),
                Component::CurDir => {}
                _ => return Ok(None),
            }
        }
        let Some(file_name) = segments.pop() else {
            return Ok(None);
        };

        let dir = if self.flat {
            target.to_path_buf()
        } else {
            let dir: PathBuf = std::iter::once(target.to_path_buf())
                .chain(segments.into_iter().map(PathBuf::from))
                .collect();
            fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
            dir
        };

        let name = self.names.unique_name(&dir, &file_name);
        Ok(Some(dir.join(name)))
    }
}

/// Output name for a gzip stream: `.gz` is stripped and `.tgz` becomes `.tar`.
pub(super) fn gunzipped_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    let stem = if lower.ends_with(".tgz") {
        format!("{}.tar", &file_name[..file_name.len() - 4])
    } else if lower.ends_with(".gz") {
        file_name[..file_name.len() - 3].to_string()
    } else {
        file_name.to_string()
    };
    sanitize_name(&stem)
}

pub(super) fn gunzip(
    archive: &Path,
    target: &Path,
    placement: Placement,
    produced: &mut Vec<PathBuf>,
) -> Result<(), ArchiveError> {
    let input = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = placement
        .names
        .unique_name(target, &gunzipped_name(&file_name));
    let out_path = target.join(name);

    let output = File::create(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
    produced.push(out_path.clone());

    // Concatenated members (pigz, appended logs) form one payload.
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);
    copy_member(&mut decoder, &mut writer, archive, &out_path)?;
    writer.flush().map_err(|e| ArchiveError::io(&out_path, e))?;

    debug!(output = %out_path.display(), "gzip stream decompressed");
    Ok(())
}

pub(super) fn unzip(
    archive: &Path,
    target: &Path,
    placement: Placement,
    produced: &mut Vec<PathBuf>,
) -> Result<(), ArchiveError> {
    let input = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(input))
        .map_err(|e| ArchiveError::corrupt(archive, e))?;

    // Every member's checksum is verified before anything is written.
    for index in 0..zip.len() {
        let mut member = zip
            .by_index(index)
            .map_err(|e| ArchiveError::corrupt(archive, e))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        io::copy(&mut member, &mut io::sink())
            .map_err(|e| ArchiveError::corrupt(archive, format!("{name}: {e}")))?;
    }

    for index in 0..zip.len() {
        let mut member = zip
            .by_index(index)
            .map_err(|e| ArchiveError::corrupt(archive, e))?;
        if member.is_dir() {
            continue;
        }
        let Some(enclosed) = member.enclosed_name() else {
            warn!(
                archive = %archive.display(),
                member = %member.name(),
                "skipping zip member outside the target directory"
            );
            continue;
        };
        let Some(out_path) = placement.output_path(target, &enclosed)? else {
            warn!(
                archive = %archive.display(),
                member = %member.name(),
                "skipping zip member outside the target directory"
            );
            continue;
        };

        let output = File::create(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
        produced.push(out_path.clone());
        let mut writer = BufWriter::new(output);
        copy_member(&mut member, &mut writer, archive, &out_path)?;
        writer.flush().map_err(|e| ArchiveError::io(&out_path, e))?;
    }

    Ok(())
}

pub(super) fn untar(
    archive: &Path,
    target: &Path,
    placement: Placement,
    produced: &mut Vec<PathBuf>,
) -> Result<(), ArchiveError> {
    let input = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let mut tar = tar::Archive::new(BufReader::new(input));
    let entries = tar
        .entries()
        .map_err(|e| ArchiveError::corrupt(archive, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::corrupt(archive, e))?;
        if !entry.header().entry_type().is_file() {
            debug!(
                archive = %archive.display(),
                kind = ?entry.header().entry_type(),
                "skipping non-regular tar member"
            );
            continue;
        }
        let member = entry
            .path()
            .map_err(|e| ArchiveError::corrupt(archive, e))?
            .into_owned();
        let Some(out_path) = placement.output_path(target, &member)? else {
            warn!(
                archive = %archive.display(),
                member = %member.display(),
                "skipping tar member outside the target directory"
            );
            continue;
        };

        let output = File::create(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
        produced.push(out_path.clone());
        let mut writer = BufWriter::new(output);
        copy_member(&mut entry, &mut writer, archive, &out_path)?;
        writer.flush().map_err(|e| ArchiveError::io(&out_path, e))?;
    }

    Ok(())
}

/// Copies one decoded member, attributing read failures to the archive and
/// write failures to the output.
fn copy_member(
    reader: &mut impl io::Read,
    writer: &mut impl Write,
    archive: &Path,
    out_path: &Path,
) -> Result<u64, ArchiveError> {
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(ArchiveError::corrupt(archive, err)),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|e| ArchiveError::io(out_path, e))?;
        total += read as u64;
    }
}
