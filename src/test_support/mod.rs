//! Shared helpers for unit tests.

pub mod socket_guard;
