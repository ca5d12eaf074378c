//! Shared User-Agent string for listing, probe, sample and download requests.
//!
//! Every request the mirror makes carries the same identification.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/mirror";

/// Default User-Agent for all mirror requests.
#[must_use]
pub(crate) fn default_mirror_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mirror/{version} (directory-index-mirror; +{PROJECT_UA_URL})")
}
