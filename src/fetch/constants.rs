//! Constants for the fetch module (timeouts, buffer sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default write buffer size for streamed downloads (512 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
