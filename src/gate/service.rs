//! Gate service: maps protected-operation requests to limiter decisions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{
    extract_identifier, Clock, OperationRules, RateLimitResult, RateLimiter, SystemClock,
};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// A request to perform a protected operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateRequest {
    /// Name of the protected operation, e.g. `login`
    pub operation: String,
    /// Inbound request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// What the caller should tell the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResponse {
    pub allowed: bool,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateResponse {
    /// Build the response for a limiter decision.
    pub fn from_result(result: &RateLimitResult) -> Self {
        Self {
            allowed: result.allowed,
            status: if result.allowed {
                STATUS_OK
            } else {
                STATUS_TOO_MANY_REQUESTS
            },
            headers: result.headers(),
            error: result.throttle_message(),
        }
    }

    /// Build the response for a request that could not be evaluated.
    pub fn invalid(error: &GatekeeperError) -> Self {
        Self {
            allowed: false,
            status: STATUS_BAD_REQUEST,
            headers: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Admission front door for protected operations.
pub struct GateService<C: Clock = SystemClock> {
    /// The shared limiter
    limiter: Arc<RateLimiter<C>>,
    /// Limits per operation
    rules: OperationRules,
}

impl<C: Clock> GateService<C> {
    /// Create a new GateService with the given limiter and rules.
    pub fn new(limiter: Arc<RateLimiter<C>>, rules: OperationRules) -> Self {
        Self { limiter, rules }
    }

    /// The limiter backing this service.
    pub fn limiter(&self) -> &Arc<RateLimiter<C>> {
        &self.limiter
    }

    /// Decide whether the request's client may perform the operation.
    #[instrument(skip(self, request), fields(operation = %request.operation))]
    pub fn check(&self, request: &GateRequest) -> Result<RateLimitResult> {
        if request.operation.is_empty() {
            warn!("Received gate request with empty operation");
            return Err(GatekeeperError::InvalidRequest(
                "operation is required".to_string(),
            ));
        }

        let rule = self.rules.get(&request.operation).ok_or_else(|| {
            warn!("Received gate request for unknown operation");
            GatekeeperError::UnknownOperation(request.operation.clone())
        })?;

        let identifier = extract_identifier(&request.headers);
        let key = rule.key_for(&identifier);

        debug!(key = %key, "Processing gate request");

        let result = self.limiter.check_rate_limit(&key, &rule.limit);

        info!(
            key = %key,
            allowed = result.allowed,
            remaining = result.remaining,
            "Gate decision made"
        );

        Ok(result)
    }

    /// Evaluate a request and render the client-facing response.
    pub fn handle(&self, request: &GateRequest) -> GateResponse {
        match self.check(request) {
            Ok(result) => GateResponse::from_result(&result),
            Err(e) => GateResponse::invalid(&e),
        }
    }
}
