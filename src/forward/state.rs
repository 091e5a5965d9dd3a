//! Per-request forwarding state machine.
//!
//! # State Transitions
//! ```text
//! AcquiringConnection → SendingRequest → AwaitingResponseHeaders → StreamingBody → Done
//!                                                                ↘ Done (no body)
//! any non-terminal state → Error (connection discarded)
//! ```

use std::fmt;

use crate::backend::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    AcquiringConnection,
    SendingRequest,
    AwaitingResponseHeaders,
    StreamingBody,
    Done,
    Error,
}

impl ForwardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardState::AcquiringConnection => "acquiring_connection",
            ForwardState::SendingRequest => "sending_request",
            ForwardState::AwaitingResponseHeaders => "awaiting_response_headers",
            ForwardState::StreamingBody => "streaming_body",
            ForwardState::Done => "done",
            ForwardState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ForwardState::Done | ForwardState::Error)
    }

    /// Whether `next` may follow `self`.
    pub fn allows(&self, next: ForwardState) -> bool {
        use ForwardState::*;
        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (AcquiringConnection, SendingRequest)
            | (SendingRequest, AwaitingResponseHeaders)
            | (AwaitingResponseHeaders, StreamingBody)
            | (AwaitingResponseHeaders, Done)
            | (StreamingBody, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ForwardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and traces the state of one forwarded request.
#[derive(Debug)]
pub struct Progress {
    connection_id: ConnectionId,
    state: ForwardState,
}

impl Progress {
    /// Starts in `AcquiringConnection`; the lease for `connection_id` was just granted.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            state: ForwardState::AcquiringConnection,
        }
    }

    pub fn state(&self) -> ForwardState {
        self.state
    }

    pub fn advance(&mut self, next: ForwardState) {
        debug_assert!(self.state.allows(next), "{} -> {}", self.state, next);
        tracing::trace!(
            connection_id = %self.connection_id,
            from = %self.state,
            to = %next,
            "Forward state"
        );
        self.state = next;
    }

    /// Move to `Error` unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(ForwardState::Error);
        }
    }
}
