//! Endpoint selection.
//!
//! # Data Flow
//! ```text
//! ConnectionPool::checkout
//!     → LoadBalancer::candidates (live endpoints, preferred first)
//!     → EndpointPool::acquire on each candidate until one connects
//! ```
//!
//! # Design Decisions
//! - The selector returns a full failover order, not a single pick
//! - Dead endpoints are excluded until their recover time passes

pub mod round_robin;

use std::sync::Arc;

use crate::backend::Endpoint;

pub use round_robin::RoundRobin;

/// Strategy that orders endpoints for one checkout.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Indices of live endpoints, in the order they should be tried.
    fn candidates(&self, endpoints: &[Arc<Endpoint>]) -> Vec<usize>;
}
