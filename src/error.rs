//! Gateway error taxonomy and host status mapping.

use axum::http::StatusCode;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors that can end a forwarded request.
///
/// Every variant maps to exactly one host-facing status via [`GatewayError::status_code`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No endpoint could be reached after bounded retries.
    #[error("cannot reach backend {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    /// No pooled connection became free within the acquire timeout.
    #[error("no connection to {endpoint} available within {waited_ms}ms")]
    PoolExhaustedTimeout { endpoint: String, waited_ms: u64 },

    /// Backend sent a malformed or truncated response.
    #[error("protocol error from backend: {0}")]
    Protocol(#[from] ProtocolError),

    /// A backend read or write exceeded its deadline.
    #[error("backend {operation} timed out after {timeout_ms}ms")]
    BackendIoTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Host-side client went away mid-request.
    #[error("client aborted request: {0}")]
    ClientAbort(String),

    /// Request cannot be expressed in the backend encoding.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection pool has been closed.
    #[error("gateway is shutting down")]
    Shutdown,
}

impl GatewayError {
    /// Status the host should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Connectivity { .. } | GatewayError::Protocol(_) => StatusCode::BAD_GATEWAY,
            GatewayError::PoolExhaustedTimeout { .. } | GatewayError::Shutdown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::BackendIoTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ClientAbort(_) => client_closed_request(),
        }
    }

    /// Whether the pooled connection involved must be thrown away.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::Protocol(_)
                | GatewayError::BackendIoTimeout { .. }
                | GatewayError::ClientAbort(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Connectivity { .. } => "connectivity",
            GatewayError::PoolExhaustedTimeout { .. } => "pool_exhausted",
            GatewayError::Protocol(_) => "protocol",
            GatewayError::BackendIoTimeout { .. } => "io_timeout",
            GatewayError::ClientAbort(_) => "client_abort",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Shutdown => "shutdown",
        }
    }
}

/// Non-standard 499 used for requests whose client disconnected.
pub fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
