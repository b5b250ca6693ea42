//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::record::LimitRecord;
use super::result::RateLimitResult;
use super::rules::{duration_ms, LimitRule};

/// Idle records older than this are removed by [`RateLimiter::sweep`].
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

/// The limiter state store.
///
/// Records live in a sharded map. The read-modify-write of an admission
/// check runs while holding the entry's shard lock, so concurrent checks for
/// one identifier are serialized while distinct identifiers proceed in parallel.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Limit records indexed by client identifier
    records: DashMap<String, LimitRecord>,
    /// Source of the current time
    clock: C,
    /// Idle horizon after which records may be swept
    retention_ms: u64,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter using the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            retention_ms: duration_ms(DEFAULT_RETENTION),
        }
    }

    /// Override the idle retention horizon.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = duration_ms(retention);
        self
    }

    /// The clock driving this limiter.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Check and record one request for `identifier`.
    ///
    /// Never fails: unknown or empty identifiers simply start a fresh bucket.
    pub fn check_rate_limit(&self, identifier: &str, rule: &LimitRule) -> RateLimitResult {
        let now = self.clock.now_ms();

        trace!(
            key = %identifier,
            max_requests = rule.max_requests,
            window_ms = rule.window_ms,
            "Checking rate limit"
        );

        let result = match self.records.entry(identifier.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().admit(identifier, now, rule),
            Entry::Vacant(entry) => {
                debug!(key = %identifier, "Creating new limit record");
                entry.insert(LimitRecord::new(now)).first_result(rule)
            }
        };

        if !result.allowed {
            debug!(
                key = %identifier,
                retry_after = ?result.retry_after_seconds,
                "Request denied"
            );
        }

        result
    }

    /// Remove every record idle for longer than the retention horizon.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let retention_ms = self.retention_ms;
        let before = self.records.len();

        self.records
            .retain(|_, record| !record.is_stale(now, retention_ms));

        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            info!(
                removed = removed,
                remaining = self.records.len(),
                "Swept idle limit records"
            );
        }
        removed
    }

    /// Snapshot of the record for an identifier.
    ///
    /// Returns `None` if no record exists.
    pub fn record(&self, identifier: &str) -> Option<LimitRecord> {
        self.records.get(identifier).map(|r| r.value().clone())
    }

    /// Whether a block is currently in force for an identifier.
    pub fn is_blocked(&self, identifier: &str) -> bool {
        let now = self.clock.now_ms();
        self.records
            .get(identifier)
            .is_some_and(|r| r.is_blocked(now))
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Get the number of tracked identifiers.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
