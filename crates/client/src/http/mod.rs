//! HTTP implementations of the collaborator traits.
//!
//! Each client makes exactly one request per call and never retries. The
//! lease manager applies its own timeout on top of the per-request timeout
//! configured here.

mod broker;
mod models;
mod oauth;

pub use broker::HttpBroker;
pub use models::HttpModelQuotaSource;
pub use oauth::OAuthTokenRefresher;

use std::time::Duration;

/// Longest error body kept for logs and error messages.
const MAX_ERROR_BODY: usize = 512;

/// Build a client with a total request timeout.
fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(concat!("poolkeeper/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Read a failed response's body for diagnostics, truncated.
async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}
