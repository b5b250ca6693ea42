//! Rate limiting logic and state management.

mod clock;
mod identifier;
mod limiter;
mod record;
mod result;
mod rules;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identifier::{extract_identifier, HeaderSource, CLIENT_IP_HEADERS, UNKNOWN_CLIENT};
pub use limiter::{RateLimiter, DEFAULT_RETENTION};
pub use record::LimitRecord;
pub use result::{RateLimitResult, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER};
pub use rules::{
    progressive_penalty_ms, LimitRule, OperationRule, OperationRules, LOGIN,
    PENALTY_SCHEDULE_MS, VERIFY_OTP, VIOLATION_DECAY_MS,
};
pub use sweeper::{Sweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
