//! Per-run counters.

use std::fmt;

/// What a walk did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Listings fetched and parsed.
    pub directories_visited: usize,
    /// Listings that could not be fetched; their subtrees were abandoned.
    pub directories_failed: usize,
    /// Leaves saved this run, new or superseding.
    pub leaves_downloaded: usize,
    /// Leaves skipped as unchanged.
    pub leaves_unchanged: usize,
    /// Leaves whose transfer or recording failed.
    pub leaves_failed: usize,
    /// Anchors not followed: off-site, backtrack, too deep or decorative.
    pub links_skipped: usize,
    /// Archives replaced by their contents.
    pub archives_expanded: usize,
    /// Archives left in place after a failed expansion.
    pub archives_failed: usize,
    /// Transfers that delivered more bytes than advertised.
    pub size_overruns: usize,
    /// The walk stopped early on request.
    pub interrupted: bool,
}

impl WalkStats {
    /// Whether any directory, leaf or archive failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.directories_failed + self.leaves_failed + self.archives_failed > 0
    }

    /// Whether the walk finished without failures or interruption.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.interrupted && !self.has_failures()
    }
}

impl fmt::Display for WalkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} directories ({} failed), {} downloaded, {} unchanged, {} failed, {} links skipped",
            self.directories_visited,
            self.directories_failed,
            self.leaves_downloaded,
            self.leaves_unchanged,
            self.leaves_failed,
            self.links_skipped,
        )?;
        if self.archives_expanded + self.archives_failed > 0 {
            write!(
                f,
                ", {} archives expanded ({} failed)",
                self.archives_expanded, self.archives_failed
            )?;
        }
        if self.size_overruns > 0 {
            write!(f, ", {} size overruns", self.size_overruns)?;
        }
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}
