//! Decides what each listing anchor is.

use std::borrow::Cow;

use url::Url;

use crate::listing::Anchor;

/// Why an anchor was not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// Empty, fragment-only or query-bearing (sort controls).
    Decorative,
    /// Absolute link outside the base URL.
    OffSite,
    /// Parent reference, the base itself, or anything not below the branch.
    Backtrack,
    /// Directory beyond the configured depth.
    TooDeep,
    /// Leaf that does not sit directly in the current branch.
    NotInBranch,
    /// Leaf whose visible text does not name it.
    TextMismatch,
    /// Href that cannot be resolved to a URL.
    Unresolvable,
}

/// Classification of one anchor relative to the branch being listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Link {
    /// Sub-directory to visit later.
    Directory {
        /// Root-relative path, ending in `/`.
        branch: String,
        /// Number of `/` in `branch`.
        depth: usize,
    },
    /// File in the current branch.
    Leaf {
        /// Percent-decoded name.
        name: String,
        /// Absolute URL.
        source: String,
    },
    Skip(SkipReason),
}

/// Classifies `anchor` found on the listing of `branch`.
pub(crate) fn classify(base: &Url, branch: &str, anchor: &Anchor, max_depth: usize) -> Link {
    let href = anchor.href.trim();
    if href.is_empty() || href.starts_with('#') || href.contains('?') {
        return Link::Skip(SkipReason::Decorative);
    }
    if href == ".." || href.starts_with("../") {
        return Link::Skip(SkipReason::Backtrack);
    }

    let Ok(listing) = base.join(branch) else {
        return Link::Skip(SkipReason::Unresolvable);
    };
    let Ok(mut resolved) = listing.join(href) else {
        return Link::Skip(SkipReason::Unresolvable);
    };
    resolved.set_fragment(None);

    let Some(relative) = resolved.as_str().strip_prefix(base.as_str()) else {
        return if is_absolute(href) {
            Link::Skip(SkipReason::OffSite)
        } else {
            Link::Skip(SkipReason::Backtrack)
        };
    };
    if relative.is_empty() || relative == branch || !relative.starts_with(branch) {
        return Link::Skip(SkipReason::Backtrack);
    }

    if relative.ends_with('/') {
        let depth = relative.matches('/').count();
        if max_depth > 0 && depth > max_depth {
            return Link::Skip(SkipReason::TooDeep);
        }
        return Link::Directory {
            branch: relative.to_string(),
            depth,
        };
    }

    let encoded_name = &relative[branch.len()..];
    if encoded_name.contains('/') {
        return Link::Skip(SkipReason::NotInBranch);
    }
    let name = percent_decode(encoded_name);

    let text = anchor.text.as_str();
    let named = text == anchor.href || text == name || text == format!("{branch}{name}");
    if !named {
        return Link::Skip(SkipReason::TextMismatch);
    }

    Link::Leaf {
        name,
        source: resolved.into(),
    }
}

fn is_absolute(href: &str) -> bool {
    if href.starts_with("//") {
        return true;
    }
    href.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), Cow::into_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/mirror/").unwrap()
    }

    fn link(branch: &str, href: &str, text: &str) -> Link {
        classify(&base(), branch, &Anchor::new(href, text), 0)
    }

    #[test]
    fn test_leaf_in_root() {
        assert_eq!(
            link("", "a.txt", "a.txt"),
            Link::Leaf {
                name: "a.txt".into(),
                source: "https://example.com/mirror/a.txt".into(),
            }
        );
    }

    #[test]
    fn test_leaf_name_is_percent_decoded() {
        assert_eq!(
            link("pub/", "a%20b.txt", "a b.txt"),
            Link::Leaf {
                name: "a b.txt".into(),
                source: "https://example.com/mirror/pub/a%20b.txt".into(),
            }
        );
    }

    #[test]
    fn test_leaf_text_may_include_branch() {
        assert!(matches!(link("pub/", "a.txt", "pub/a.txt"), Link::Leaf { .. }));
    }

    #[test]
    fn test_leaf_with_unrelated_text_is_decorative() {
        assert_eq!(
            link("", "a.txt", "Download"),
            Link::Skip(SkipReason::TextMismatch)
        );
    }

    #[test]
    fn test_directory_depth_counts_slashes() {
        assert_eq!(
            link("", "pub/", "pub/"),
            Link::Directory {
                branch: "pub/".into(),
                depth: 1
            }
        );
        assert_eq!(
            link("pub/", "iso/", "iso/"),
            Link::Directory {
                branch: "pub/iso/".into(),
                depth: 2
            }
        );
    }

    #[test]
    fn test_directory_beyond_max_depth_skipped() {
        let anchor = Anchor::new("deep/", "deep/");
        assert_eq!(
            classify(&base(), "a/b/", &anchor, 2),
            Link::Skip(SkipReason::TooDeep)
        );
        assert!(matches!(
            classify(&base(), "a/", &anchor, 2),
            Link::Directory { depth: 2, .. }
        ));
    }

    #[test]
    fn test_sort_links_and_fragments_are_decorative() {
        assert_eq!(link("", "?C=N;O=D", "Name"), Link::Skip(SkipReason::Decorative));
        assert_eq!(link("", "#top", "top"), Link::Skip(SkipReason::Decorative));
        assert_eq!(link("", "", ""), Link::Skip(SkipReason::Decorative));
    }

    #[test]
    fn test_parent_and_self_references_backtrack() {
        assert_eq!(link("pub/", "../", "Parent Directory"), Link::Skip(SkipReason::Backtrack));
        assert_eq!(link("pub/", "/mirror/", "Parent"), Link::Skip(SkipReason::Backtrack));
        assert_eq!(link("pub/", "./", "."), Link::Skip(SkipReason::Backtrack));
        assert_eq!(link("", "/", "/"), Link::Skip(SkipReason::Backtrack));
    }

    #[test]
    fn test_sibling_branch_backtracks() {
        assert_eq!(
            link("pub/", "/mirror/other/", "other/"),
            Link::Skip(SkipReason::Backtrack)
        );
    }

    #[test]
    fn test_off_site_absolute_hrefs() {
        assert_eq!(
            link("", "https://elsewhere.example/a.txt", "a.txt"),
            Link::Skip(SkipReason::OffSite)
        );
        assert_eq!(
            link("", "//elsewhere.example/pub/", "pub/"),
            Link::Skip(SkipReason::OffSite)
        );
    }

    #[test]
    fn test_absolute_href_under_base_is_followed() {
        assert_eq!(
            link("", "https://example.com/mirror/pub/", "pub/"),
            Link::Directory {
                branch: "pub/".into(),
                depth: 1
            }
        );
    }

    #[test]
    fn test_leaf_outside_current_branch_skipped() {
        assert_eq!(
            link("", "pub/a.txt", "pub/a.txt"),
            Link::Skip(SkipReason::NotInBranch)
        );
    }
}
