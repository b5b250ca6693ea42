//! Per-identifier limit record and the admission algorithm.

use tracing::{debug, warn};

use super::result::RateLimitResult;
use super::rules::{LimitRule, VIOLATION_DECAY_MS};

/// Counter state tracked for one client identifier.
///
/// Records are created on the first request and only ever mutated while the
/// store holds the identifier's entry exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRecord {
    /// Requests seen in the current window
    pub count: u32,
    /// Start of the current window (epoch ms)
    pub window_start: u64,
    /// Most recent counted request (epoch ms)
    pub last_seen: u64,
    /// All requests are denied until this time (epoch ms)
    pub blocked_until: Option<u64>,
    /// Number of times the limit was exceeded
    pub violation_count: u32,
    /// Time of the most recent violation (epoch ms)
    pub last_violation: Option<u64>,
}

impl LimitRecord {
    /// Create the record for a first request at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            count: 1,
            window_start: now,
            last_seen: now,
            blocked_until: None,
            violation_count: 0,
            last_violation: None,
        }
    }

    /// Result for the request that created this record.
    pub fn first_result(&self, rule: &LimitRule) -> RateLimitResult {
        RateLimitResult::allow(
            rule.max_requests.saturating_sub(1),
            self.window_start.saturating_add(rule.window_ms),
        )
    }

    /// Whether a block is in force at `now`.
    pub fn is_blocked(&self, now: u64) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Whether the record has been idle longer than `retention_ms`.
    pub fn is_stale(&self, now: u64, retention_ms: u64) -> bool {
        now.saturating_sub(self.last_seen) > retention_ms
    }

    /// Admit or deny one request against an existing record.
    pub fn admit(&mut self, key: &str, now: u64, rule: &LimitRule) -> RateLimitResult {
        if let Some(until) = self.blocked_until {
            if now < until {
                return RateLimitResult::deny(until, until - now);
            }
            self.blocked_until = None;
        }

        if self
            .last_violation
            .is_some_and(|at| now.saturating_sub(at) > VIOLATION_DECAY_MS)
            && self.violation_count > 0
        {
            debug!(
                key = %key,
                violations = self.violation_count,
                "Violation history expired"
            );
            self.violation_count = 0;
        }

        if now.saturating_sub(self.window_start) > rule.window_ms {
            self.count = 1;
            self.window_start = now;
            self.last_seen = now;
            return self.first_result(rule);
        }

        self.count = self.count.saturating_add(1);
        self.last_seen = now;

        if self.count <= rule.max_requests {
            return RateLimitResult::allow(
                rule.max_requests - self.count,
                self.window_start.saturating_add(rule.window_ms),
            );
        }

        self.violation_count = self.violation_count.saturating_add(1);
        self.last_violation = Some(now);

        let penalty = rule.penalty_ms(self.violation_count);
        let until = now.saturating_add(penalty);
        self.blocked_until = Some(until);

        warn!(
            key = %key,
            violation = self.violation_count,
            penalty_ms = penalty,
            "Rate limit exceeded, blocking identifier"
        );

        RateLimitResult::deny(until, penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINUTE: u64 = 60_000;

    fn rule(max_requests: u32) -> LimitRule {
        LimitRule::new(
            max_requests,
            Duration::from_secs(300),
            Duration::from_secs(900),
        )
    }

    #[test]
    fn test_new_record() {
        let record = LimitRecord::new(1_000);
        assert_eq!(record.count, 1);
        assert_eq!(record.window_start, 1_000);
        assert_eq!(record.last_seen, 1_000);
        assert!(!record.is_blocked(1_000));

        let result = record.first_result(&rule(3));
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
        assert_eq!(result.reset_time, 1_000 + 5 * MINUTE);
    }

    #[test]
    fn test_increment_within_window() {
        let rule = rule(3);
        let mut record = LimitRecord::new(0);

        let result = record.admit("k", 10, &rule);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
        assert_eq!(result.reset_time, 5 * MINUTE);
        assert_eq!(record.count, 2);
        assert_eq!(record.last_seen, 10);
    }

    #[test]
    fn test_violation_sets_block() {
        let rule = rule(1);
        let mut record = LimitRecord::new(0);

        let result = record.admit("k", 100, &rule);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.reset_time, 100 + MINUTE);
        assert_eq!(result.retry_after_seconds, Some(60));
        assert_eq!(record.violation_count, 1);
        assert_eq!(record.last_violation, Some(100));
        assert_eq!(record.blocked_until, Some(100 + MINUTE));
    }

    #[test]
    fn test_active_block_does_not_mutate() {
        let rule = rule(1);
        let mut record = LimitRecord::new(0);
        record.admit("k", 0, &rule);
        let snapshot = record.clone();

        let result = record.admit("k", 30_500, &rule);
        assert!(!result.allowed);
        assert_eq!(result.retry_after_seconds, Some(30));
        assert_eq!(result.reset_time, MINUTE);
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_block_expiry_clears_block() {
        let rule = rule(1);
        let mut record = LimitRecord::new(0);
        record.admit("k", 0, &rule);

        // Window (5 min) has expired by the time we come back at 6 min
        let result = record.admit("k", 6 * MINUTE, &rule);
        assert!(result.allowed);
        assert_eq!(record.blocked_until, None);
        assert_eq!(record.count, 1);
        assert_eq!(record.violation_count, 1);
    }

    #[test]
    fn test_window_rollover_boundary_is_exclusive() {
        let rule = rule(2);
        let mut record = LimitRecord::new(0);

        // Exactly window_ms later is still the same window
        let result = record.admit("k", 5 * MINUTE, &rule);
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(record.count, 2);

        let result = record.admit("k", 5 * MINUTE + 1, &rule);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
        assert_eq!(result.reset_time, 10 * MINUTE + 1);
        assert_eq!(record.count, 1);
        assert_eq!(record.window_start, 5 * MINUTE + 1);
    }

    #[test]
    fn test_violation_decays_after_an_hour() {
        let rule = rule(1);
        let mut record = LimitRecord::new(0);
        record.admit("k", 0, &rule);
        assert_eq!(record.violation_count, 1);

        record.admit("k", 61 * MINUTE, &rule);
        assert_eq!(record.violation_count, 0);

        let result = record.admit("k", 61 * MINUTE + 1, &rule);
        assert!(!result.allowed);
        assert_eq!(record.violation_count, 1);
        assert_eq!(result.retry_after_seconds, Some(60));
    }

    #[test]
    fn test_decay_applies_after_block_already_cleared() {
        let rule = rule(1);
        let mut record = LimitRecord::new(0);
        record.admit("k", 0, &rule);
        assert_eq!(record.blocked_until, Some(MINUTE));

        // Block is cleared here, well inside the decay horizon.
        let result = record.admit("k", 6 * MINUTE, &rule);
        assert!(result.allowed);
        assert_eq!(record.blocked_until, None);
        assert_eq!(record.violation_count, 1);

        // No block is pending, yet history older than an hour still decays.
        let result = record.admit("k", 62 * MINUTE, &rule);
        assert!(result.allowed);
        assert_eq!(record.violation_count, 0);

        let result = record.admit("k", 62 * MINUTE + 1, &rule);
        assert!(!result.allowed);
        assert_eq!(record.violation_count, 1);
        assert_eq!(result.retry_after_seconds, Some(60));
    }

    #[test]
    fn test_fixed_block_duration() {
        let rule = rule(1).progressive(false);
        let mut record = LimitRecord::new(0);

        let result = record.admit("k", 0, &rule);
        assert_eq!(result.retry_after_seconds, Some(900));
        assert_eq!(record.blocked_until, Some(15 * MINUTE));
    }

    #[test]
    fn test_stale() {
        let record = LimitRecord::new(0);
        assert!(!record.is_stale(10 * MINUTE, 10 * MINUTE));
        assert!(record.is_stale(10 * MINUTE + 1, 10 * MINUTE));
    }
}
