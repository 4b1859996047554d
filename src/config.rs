//! Gateway and polling configuration.
//!
//! Both structs are plain serde-friendly data so the host application can
//! load them from whatever settings store it already has.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for gateway requests (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between status polls while a payment is pending.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Longer interval used after a status check fails at the transport level.
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 5_000;

/// Ceiling on status checks per payment attempt. Polling an abandoned
/// session must not run forever; on exhaustion the session fails with a
/// timeout message.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

// ---------------------------------------------------------------------------
// Gateway config
// ---------------------------------------------------------------------------

/// Connection settings for the remote payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider API base URL. Normalised via [`normalize_base_url`].
    pub base_url: String,
    /// Bearer token for the provider API.
    pub access_token: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            access_token: access_token.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Normalise the provider base URL:
/// - strip trailing slashes
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Poll config
// ---------------------------------------------------------------------------

/// Timing knobs for the status poll chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between consecutive status checks.
    pub poll_interval_ms: u64,
    /// Delay used instead of `poll_interval_ms` after a transport failure.
    pub error_backoff_ms: u64,
    /// Maximum number of status checks per attempt.
    pub max_poll_attempts: u32,
    /// When set, an approved session finalizes the order and resets to idle
    /// after this delay instead of waiting for the cashier.
    pub auto_advance_after_approval_ms: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            auto_advance_after_approval_ms: None,
        }
    }
}

impl PollConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn auto_advance_after_approval(&self) -> Option<Duration> {
        self.auto_advance_after_approval_ms.map(Duration::from_millis)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_https_scheme() {
        assert_eq!(
            normalize_base_url("api.provider.com"),
            "https://api.provider.com"
        );
    }

    #[test]
    fn test_normalize_uses_http_for_localhost() {
        assert_eq!(normalize_base_url("localhost:8069"), "http://localhost:8069");
        assert_eq!(
            normalize_base_url("127.0.0.1:8069"),
            "http://127.0.0.1:8069"
        );
    }

    #[test]
    fn test_normalize_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://api.provider.com///"),
            "https://api.provider.com"
        );
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(
            normalize_base_url("  https://api.provider.com  "),
            "https://api.provider.com"
        );
    }

    #[test]
    fn test_poll_config_defaults() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(3_000));
        assert_eq!(cfg.error_backoff(), Duration::from_millis(5_000));
        assert_eq!(cfg.max_poll_attempts, 100);
        assert!(cfg.auto_advance_after_approval().is_none());
    }
}
