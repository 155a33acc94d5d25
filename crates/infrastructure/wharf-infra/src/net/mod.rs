use std::time::Duration;

use reqwest::Client;

const USER_AGENT: &str = concat!("wharf/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client tuned for many small concurrent requests against a
/// single origin. Per-request deadlines are set by the callers.
pub fn default_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(32)
        .build()
}
