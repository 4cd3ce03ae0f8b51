//! Helper utilities shared by the outbound HTTP clients

use std::time::Duration;

/// Upper bound on TCP connect time for outbound calls
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an outbound client whose every request is bounded by `timeout`
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(concat!("guard-webhook/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Truncate an upstream body for error messages
pub fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
