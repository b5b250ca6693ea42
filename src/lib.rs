//! Gatekeeper - Abuse Rate Limiting for Authentication Entry Points
//!
//! This crate implements an in-process, per-client rate limiter for sensitive
//! endpoints such as login challenges and one-time code verification. Repeat
//! offenders are blocked for progressively longer periods, and idle state is
//! swept in the background so memory stays bounded without an external store.

pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
