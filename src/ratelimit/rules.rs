//! Rate limit rules and the progressive penalty policy.
//!
//! A [`LimitRule`] is the plain-data configuration passed to every admission
//! check. [`OperationRules`] names one rule per protected operation (login
//! challenge, one-time code verification, ...) and can be loaded from YAML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};

const MINUTE_MS: u64 = 60 * 1000;

/// Block durations for successive violations, in milliseconds.
///
/// Indexed by violation count (1-based); counts past the end use the last entry.
pub const PENALTY_SCHEDULE_MS: [u64; 4] = [
    MINUTE_MS,
    15 * MINUTE_MS,
    30 * MINUTE_MS,
    60 * MINUTE_MS,
];

/// Violation history is forgotten after this long without a new violation.
pub const VIOLATION_DECAY_MS: u64 = 60 * MINUTE_MS;

/// Name of the operation that starts a login challenge.
pub const LOGIN: &str = "login";
/// Name of the operation that verifies a one-time code.
pub const VERIFY_OTP: &str = "verify_otp";

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Penalty for the given (1-based) violation number under the progressive schedule.
pub fn progressive_penalty_ms(violation_count: u32) -> u64 {
    let index = (violation_count.max(1) as usize - 1).min(PENALTY_SCHEDULE_MS.len() - 1);
    PENALTY_SCHEDULE_MS[index]
}

/// Limits applied to one protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Fixed penalty used when progressive blocking is off
    pub block_duration_ms: u64,
    /// Escalate penalties for repeat offenders
    #[serde(default = "default_progressive")]
    pub use_progressive_blocking: bool,
}

fn default_progressive() -> bool {
    true
}

impl LimitRule {
    /// Create a rule with progressive blocking enabled.
    pub fn new(max_requests: u32, window: Duration, block_duration: Duration) -> Self {
        Self {
            max_requests,
            window_ms: duration_ms(window),
            block_duration_ms: duration_ms(block_duration),
            use_progressive_blocking: true,
        }
    }

    /// Switch progressive blocking on or off.
    pub fn progressive(mut self, enabled: bool) -> Self {
        self.use_progressive_blocking = enabled;
        self
    }

    /// Penalty to apply for the given violation number.
    pub fn penalty_ms(&self, violation_count: u32) -> u64 {
        if self.use_progressive_blocking {
            progressive_penalty_ms(violation_count)
        } else {
            self.block_duration_ms
        }
    }

    /// Reject rules that could never admit a request.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(GatekeeperError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(GatekeeperError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if !self.use_progressive_blocking && self.block_duration_ms == 0 {
            return Err(GatekeeperError::Config(
                "block_duration_ms must be greater than zero when progressive blocking is off"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A rule bound to a protected operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRule {
    #[serde(flatten)]
    pub limit: LimitRule,
    /// Suffix keeping this operation's counters apart from others
    #[serde(default)]
    pub namespace: Option<String>,
}

impl OperationRule {
    /// Build the store key for a client identifier.
    pub fn key_for(&self, identifier: &str) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}:{}", identifier, ns),
            _ => identifier.to_string(),
        }
    }
}

/// Rules for every protected operation, keyed by operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationRules {
    operations: BTreeMap<String, OperationRule>,
}

impl Default for OperationRules {
    fn default() -> Self {
        let five_minutes = Duration::from_secs(5 * 60);
        let fallback_block = Duration::from_secs(15 * 60);

        let mut operations = BTreeMap::new();
        operations.insert(
            LOGIN.to_string(),
            OperationRule {
                limit: LimitRule::new(3, five_minutes, fallback_block),
                namespace: None,
            },
        );
        operations.insert(
            VERIFY_OTP.to_string(),
            OperationRule {
                limit: LimitRule::new(5, five_minutes, fallback_block),
                namespace: Some("verify".to_string()),
            },
        );
        Self { operations }
    }
}

impl OperationRules {
    /// Create an empty rule set.
    pub fn empty() -> Self {
        Self {
            operations: BTreeMap::new(),
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading operation rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string mapping operation names to rules.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: OperationRules = serde_yaml::from_str(yaml).map_err(|e| {
            GatekeeperError::Config(format!("Failed to parse operation rules: {}", e))
        })?;
        rules.validate()?;
        Ok(rules)
    }

    /// Add or replace the rule for an operation.
    pub fn insert(&mut self, operation: impl Into<String>, rule: OperationRule) {
        self.operations.insert(operation.into(), rule);
    }

    /// Look up the rule for an operation.
    pub fn get(&self, operation: &str) -> Option<&OperationRule> {
        self.operations.get(operation)
    }

    /// Names of all configured operations.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Validate every rule, naming the offending operation on failure.
    pub fn validate(&self) -> Result<()> {
        for (name, rule) in &self.operations {
            rule.limit.validate().map_err(|e| {
                GatekeeperError::Config(format!("operation '{}': {}", name, e))
            })?;
        }
        Ok(())
    }
}
