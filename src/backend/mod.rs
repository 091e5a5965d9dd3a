//! Application-server side of the gateway.
//!
//! # Data Flow
//! ```text
//! BackendConfig + HealthConfig
//!     → endpoint.rs (identity, address, passive health)
//!     → connection.rs (TCP channel opened by the pool, framed I/O)
//! ```
//!
//! # Design Decisions
//! - Endpoint health tracks connectivity only; protocol errors stay per-connection
//! - Connections carry their own read buffer and liveness flag

pub mod connection;
pub mod endpoint;

pub use connection::{BackendConnection, ConnectionId};
pub use endpoint::{Endpoint, HealthState};
