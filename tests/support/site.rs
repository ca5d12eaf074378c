//! Mock directory-index sites served by wiremock.
//!
//! Every site lives under `/mirror/` on the mock server so tests can also
//! mount off-site paths on the same host.

use mirror_core::MirrorConfig;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path prefix of the mirrored tree on the mock server.
pub const ROOT: &str = "/mirror/";

/// Renders an Apache-style index page whose anchors display their href.
pub fn index_page(entries: &[&str]) -> String {
    let rows: String = entries
        .iter()
        .map(|entry| format!("<tr><td><a href=\"{entry}\">{entry}</a></td></tr>\n"))
        .collect();
    format!(
        "<html><body><h1>Index</h1><table>\n\
         <tr><th><a href=\"?C=N;O=D\">Name</a></th></tr>\n\
         <tr><td><a href=\"../\">Parent Directory</a></td></tr>\n\
         {rows}</table></body></html>"
    )
}

/// Serves `html` as the listing of `branch` (relative to [`ROOT`]).
pub async fn mount_listing(server: &MockServer, branch: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}{branch}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Serves an index page listing `entries` for `branch`.
pub async fn mount_index(server: &MockServer, branch: &str, entries: &[&str]) {
    mount_listing(server, branch, index_page(entries)).await;
}

/// Serves `body` at `file` (relative to [`ROOT`]).
pub async fn mount_file(server: &MockServer, file: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Serves `body` at `file` and asserts on drop that it was requested
/// exactly `times` times.
pub async fn mount_file_expecting(server: &MockServer, file: &str, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

/// Mirror configuration for the site on `server`, saving into `dir`.
pub fn config_for(server: &MockServer, dir: &TempDir) -> MirrorConfig {
    MirrorConfig::new(&format!("{}{ROOT}", server.uri()), dir.path())
        .expect("mock server URI is a valid base URL")
}
