//! Request forwarding over pooled backend connections.
//!
//! # Data Flow
//! ```text
//! HandlerRequest + PooledConnection
//!     → forwarder.rs: encode head (hop-by-hop headers stripped)
//!     → stream request body as chunk frames, then the end frame
//!     → read status + headers until the first body frame or end frame
//!     → body.rs: lazy stream over the remaining frames (owns the lease)
//!     → HandlerResponse
//! ```
//!
//! # Design Decisions
//! - Response bodies are never buffered; frames are read as the host polls
//! - Any I/O error, timeout or bad frame leaves the connection unhealthy
//! - Nothing here retries; a request reaches the backend at most once
//! - state.rs traces every transition at `trace` level

pub mod body;
pub mod forwarder;
pub mod state;

pub use forwarder::{strip_hop_by_hop, RequestForwarder};
pub use state::ForwardState;
