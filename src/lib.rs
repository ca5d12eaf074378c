//! Mirror Core Library
//!
//! Incrementally mirrors a remote HTTP directory index into a local directory.
//! Each run walks the index depth-first, downloads leaves that are new or
//! whose sampled content changed, records every save in a durable manifest,
//! and can expand downloaded archives in place.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`walker`] - Depth-first traversal and the [`Mirror`] run driver
//! - [`manifest`] - Append-only record of saved leaves
//! - [`detect`] - Sampled-digest change detection
//! - [`expand`] - gzip, zip and tar expansion with a bounded cascade
//! - [`naming`] - Collision-free local file names
//! - [`fetch`] - HTTP listing, probe, sample and download
//! - [`listing`] - Anchor extraction from index pages
//! - [`config`] - Run configuration and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detect;
pub mod expand;
pub mod fetch;
pub mod listing;
pub mod manifest;
pub mod naming;
pub mod walker;

#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, MirrorConfig};
pub use detect::{ChangeDetector, Verdict};
pub use expand::{ArchiveError, ArchiveExpander, Expansion};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use listing::{Anchor, HtmlAnchorParser, ListingParser};
pub use manifest::{
    CorruptManifestPolicy, ManifestEntry, ManifestError, ManifestOptions, ManifestStore,
};
pub use naming::NameAllocator;
pub use walker::{Mirror, WalkError, WalkStats, Walker};
