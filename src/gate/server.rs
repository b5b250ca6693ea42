//! Newline-delimited JSON server for the gate service.
//!
//! Each input line is a [`GateRequest`]; each output line is the matching
//! [`GateResponse`]. Malformed lines get a `400` response and do not stop
//! the server.

use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::service::{GateRequest, GateResponse, GateService};
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{Clock, SystemClock};

/// Line-oriented server for the gate protocol.
pub struct GateServer<C: Clock = SystemClock> {
    /// The gate service instance
    service: Arc<GateService<C>>,
}

impl<C: Clock> GateServer<C> {
    /// Create a new server around a gate service.
    pub fn new(service: Arc<GateService<C>>) -> Self {
        Self { service }
    }

    /// Serve until the reader reaches end of input.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.serve_with_shutdown(reader, writer, std::future::pending())
            .await
    }

    /// Serve until end of input or until the provided signal resolves.
    pub async fn serve_with_shutdown<R, W, F>(self, reader: R, mut writer: W, signal: F) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut reader = BufReader::new(reader);
        // Partial reads survive a cancelled `read_until`, so the buffer lives
        // outside the loop and is cleared only after a full line is handled.
        let mut buf = Vec::new();
        tokio::pin!(signal);

        info!("Gate server accepting requests");

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Gate server shutting down");
                    break;
                }
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        info!("Gate input closed");
                        break;
                    }

                    let response = match std::str::from_utf8(&buf) {
                        Ok(line) if line.trim().is_empty() => None,
                        Ok(line) => Some(self.respond(line.trim_end_matches(['\n', '\r']))),
                        Err(e) => {
                            warn!(error = %e, "Gate request is not valid UTF-8");
                            Some(GateResponse::invalid(&GatekeeperError::InvalidRequest(
                                e.to_string(),
                            )))
                        }
                    };
                    buf.clear();

                    if let Some(response) = response {
                        let mut encoded = serde_json::to_vec(&response)?;
                        encoded.push(b'\n');
                        writer.write_all(&encoded).await?;
                        writer.flush().await?;
                    }
                }
            }
        }

        writer.flush().await?;
        Ok(())
    }

    fn respond(&self, line: &str) -> GateResponse {
        match serde_json::from_str::<GateRequest>(line) {
            Ok(request) => self.service.handle(&request),
            Err(e) => {
                warn!(error = %e, "Malformed gate request");
                debug!(line = %line, "Rejected input");
                GateResponse::invalid(&GatekeeperError::InvalidRequest(e.to_string()))
            }
        }
    }
}
