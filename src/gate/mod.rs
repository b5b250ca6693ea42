//! Gate: the caller-side adapter in front of the limiter.
//!
//! Endpoint handlers hand over an operation name and the inbound headers;
//! the gate extracts the client identifier, applies the operation's rule and
//! returns the status and headers to send back.

mod server;
mod service;

pub use server::GateServer;
pub use service::{
    GateRequest, GateResponse, GateService, STATUS_BAD_REQUEST, STATUS_OK,
    STATUS_TOO_MANY_REQUESTS,
};
