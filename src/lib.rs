//! Application gateway library.
//!
//! A reusable, concurrency-safe request handler that forwards host HTTP
//! requests to application servers over a bounded, fair connection pool.

pub mod backend;
pub mod config;
pub mod error;
pub mod forward;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod pool;
pub mod protocol;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use handler::{GatewayHandlerFactory, HandlerFactory, HandlerRequest, HandlerResponse, SharedHandler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pool::{ConnectionPool, PoolStats};
