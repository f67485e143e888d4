//! HTTP-backed implementations of the collaborator traits.

mod auth;
mod settings;
mod usage;
mod vendor;

pub use auth::HttpAuthVerifier;
pub use settings::HttpSettingsStore;
pub use usage::HttpUsageOracle;
pub use vendor::HttpVendor;

use std::time::Duration;

/// Shared reqwest client with a hard transport deadline. The gateway
/// wraps calls in its own deadline as well; this one is the backstop.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
