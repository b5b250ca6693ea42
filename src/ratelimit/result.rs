//! Admission decisions and their client-visible form.

use std::collections::BTreeMap;

pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window (0 when denied)
    pub remaining: u32,
    /// Epoch milliseconds at which the window or block ends
    pub reset_time: u64,
    /// Seconds the client should wait; set only on denial
    pub retry_after_seconds: Option<u64>,
}

impl RateLimitResult {
    pub(crate) fn allow(remaining: u32, reset_time: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time,
            retry_after_seconds: None,
        }
    }

    pub(crate) fn deny(reset_time: u64, wait_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time,
            retry_after_seconds: Some(wait_ms.div_ceil(1000)),
        }
    }

    /// Response headers describing this decision.
    ///
    /// Only quota and timing figures are exposed; violation history stays internal.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_REMAINING.to_string(), self.remaining.to_string());
        headers.insert(
            HEADER_RESET.to_string(),
            self.reset_time.div_ceil(1000).to_string(),
        );
        if let Some(retry_after) = self.retry_after_seconds {
            headers.insert(HEADER_RETRY_AFTER.to_string(), retry_after.to_string());
        }
        headers
    }

    /// Message shown to a throttled client, `None` when allowed.
    pub fn throttle_message(&self) -> Option<String> {
        self.retry_after_seconds.filter(|_| !self.allowed).map(|secs| {
            format!("Too many requests. Please try again in {} seconds.", secs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_rounds_retry_after_up() {
        let result = RateLimitResult::deny(10_001, 1_001);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.retry_after_seconds, Some(2));
    }

    #[test]
    fn test_allowed_headers() {
        let result = RateLimitResult::allow(2, 1_700_000_000_500);
        let headers = result.headers();

        assert_eq!(headers[HEADER_REMAINING], "2");
        assert_eq!(headers[HEADER_RESET], "1700000001");
        assert!(!headers.contains_key(HEADER_RETRY_AFTER));
        assert_eq!(result.throttle_message(), None);
    }

    #[test]
    fn test_denied_headers() {
        let result = RateLimitResult::deny(120_000, 60_000);
        let headers = result.headers();

        assert_eq!(headers[HEADER_REMAINING], "0");
        assert_eq!(headers[HEADER_RETRY_AFTER], "60");
        assert_eq!(
            result.throttle_message().as_deref(),
            Some("Too many requests. Please try again in 60 seconds.")
        );
    }
}
