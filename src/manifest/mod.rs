//! Durable record of which leaves have been saved and how they looked.
//!
//! The manifest lives at `<save_dir>/.manifest` as an append-only JSON Lines
//! log. Every save appends a record before the walk moves on, so an
//! interrupted run loses at most the leaf in flight. A clean run ends with
//! [`ManifestStore::finalize`], which compacts the log to one record per live
//! entry.

mod entry;
mod error;
mod store;

pub use entry::{ManifestEntry, directory_path, peek_sample_length};
pub use error::ManifestError;
pub use store::{
    CorruptManifestPolicy, LoadOutcome, MANIFEST_FILE_NAME, ManifestOptions, ManifestStore,
};
