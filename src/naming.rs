//! Collision-free local file names.
//!
//! Names are probed against the target directory once, when a leaf is saved
//! or an archive member is extracted, and the result is cached by the caller
//! (see [`crate::manifest::ManifestEntry::local_name`]). Nothing here locks:
//! the mirror is the only writer in its save directory.

use std::path::{Component, Path};

/// Default number of trailing `.segment` tokens treated as one extension.
pub const DEFAULT_MAX_EXTENSION_SEGMENTS: usize = 2;

/// Longest single segment (without the dot) that still counts as an extension.
const MAX_SEGMENT_LEN: usize = 5;

/// Allocates unique names inside a directory.
///
/// # Example
///
/// ```
/// use mirror_core::naming::NameAllocator;
///
/// let names = NameAllocator::default();
/// assert_eq!(
///     names.split_extension("report.tar.gz"),
///     ("report".to_string(), ".tar.gz".to_string())
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameAllocator {
    max_extension_segments: usize,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXTENSION_SEGMENTS)
    }
}

impl NameAllocator {
    /// Creates an allocator that keeps up to `max_extension_segments` trailing
    /// segments together as the extension.
    #[must_use]
    pub fn new(max_extension_segments: usize) -> Self {
        Self {
            max_extension_segments,
        }
    }

    /// Splits `name` into base and (possibly compound) extension.
    ///
    /// A trailing segment is peeled only while it is 1 to 5 characters long
    /// and something non-empty remains in front of it, so `.bashrc` has no
    /// extension and `notes.final-draft.txt` keeps only `.txt`.
    #[must_use]
    pub fn split_extension(&self, name: &str) -> (String, String) {
        let mut base = name;
        let mut peeled = 0;

        while peeled < self.max_extension_segments {
            let Some(dot) = base.rfind('.') else {
                break;
            };
            let segment = &base[dot + 1..];
            if dot == 0 || segment.is_empty() || segment.chars().count() > MAX_SEGMENT_LEN {
                break;
            }
            base = &base[..dot];
            peeled += 1;
        }

        (base.to_string(), name[base.len()..].to_string())
    }

    /// Returns a name for `desired` that does not exist yet in `dir`.
    ///
    /// `desired` is returned unchanged when free; otherwise `"{base} (0){ext}"`,
    /// `"{base} (1){ext}"`, ... are probed in order.
    #[must_use]
    pub fn unique_name(&self, dir: &Path, desired: &str) -> String {
        let desired = sanitize_name(desired);
        if !dir.join(&desired).exists() {
            return desired;
        }

        let (base, ext) = self.split_extension(&desired);
        (0u64..)
            .map(|i| format!("{base} ({i}){ext}"))
            .find(|candidate| !dir.join(candidate).exists())
            .unwrap_or(desired)
    }
}

/// Makes a remote name safe to use as a single local path segment.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn split(name: &str) -> (String, String) {
        NameAllocator::default().split_extension(name)
    }

    #[test]
    fn test_split_extension_compound() {
        assert_eq!(split("report.tar.gz"), ("report".into(), ".tar.gz".into()));
    }

    #[test]
    fn test_split_extension_respects_segment_limit() {
        let one = NameAllocator::new(1);
        assert_eq!(
            one.split_extension("report.tar.gz"),
            ("report.tar".into(), ".gz".into())
        );
        assert_eq!(
            split("archive.v1.tar.gz"),
            ("archive.v1".into(), ".tar.gz".into())
        );
    }

    #[test]
    fn test_split_extension_simple_and_none() {
        assert_eq!(split("a.txt"), ("a".into(), ".txt".into()));
        assert_eq!(split("README"), ("README".into(), String::new()));
        assert_eq!(split(".bashrc"), (".bashrc".into(), String::new()));
        assert_eq!(split("trailing."), ("trailing.".into(), String::new()));
    }

    #[test]
    fn test_split_extension_skips_long_segments() {
        assert_eq!(
            split("notes.final-draft.txt"),
            ("notes.final-draft".into(), ".txt".into())
        );
    }

    #[test]
    fn test_unique_name_free_name_unchanged() {
        let dir = TempDir::new().unwrap();
        let names = NameAllocator::default();
        assert_eq!(names.unique_name(dir.path(), "a.txt"), "a.txt");
    }

    #[test]
    fn test_unique_name_probes_in_order() {
        let dir = TempDir::new().unwrap();
        let names = NameAllocator::default();

        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert_eq!(names.unique_name(dir.path(), "a.txt"), "a (0).txt");

        std::fs::write(dir.path().join("a (0).txt"), b"x").unwrap();
        assert_eq!(names.unique_name(dir.path(), "a.txt"), "a (1).txt");
    }

    #[test]
    fn test_unique_name_keeps_compound_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data.tar.gz"), b"x").unwrap();
        assert_eq!(
            NameAllocator::default().unique_name(dir.path(), "data.tar.gz"),
            "data (0).tar.gz"
        );
    }

    #[test]
    fn test_sanitize_name_rewrites_separators_and_dot_segments() {
        assert_eq!(sanitize_name("a/b.txt"), "a_b.txt");
        assert_eq!(sanitize_name(".."), "__");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name("file (1).pdf"), "file (1).pdf");
    }
}
