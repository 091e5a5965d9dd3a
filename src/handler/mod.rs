//! Handler factory contract and the shared handler.
//!
//! # Data Flow
//! ```text
//! Host request
//!     → HandlerFactory::get_handler (same Arc every call)
//!     → SharedHandler::process(HandlerRequest)
//!         → ConnectionPool::checkout → RequestForwarder::forward
//!         → errors mapped to HandlerResponse
//!     → HandlerFactory::release_handler (no-op)
//! ```
//!
//! # Design Decisions
//! - One handler per factory, built at construction; `is_reusable` is always true
//! - The handler has no per-request fields; request state is passed explicitly
//! - Factory construction prewarms the pool and fails if nothing is reachable

pub mod factory;
pub mod request;
pub mod response;
pub mod shared;

pub use factory::{GatewayHandlerFactory, HandlerFactory, RequestHandler};
pub use request::{BodyError, BodyLength, HandlerRequest, RequestBody, RequestParts};
pub use response::{HandlerResponse, ResponseBody};
pub use shared::SharedHandler;
