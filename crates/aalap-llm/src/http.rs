//! Shared HTTP client construction for consistent timeout configuration.

use std::time::Duration;

/// Create the HTTP client used by the remote providers.
///
/// 30s connect timeout, 120s request timeout, `aalap/{version}` user-agent,
/// redirect limit 10. Falls back to a plain client if the builder is rejected.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("aalap/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_default()
}
