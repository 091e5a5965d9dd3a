//! HTTP host adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum / hyper)
//!     → server.rs (middleware: trace, request ID, in-flight limit, timeout)
//!     → request.rs (axum Request → HandlerRequest)
//!     → SharedHandler::process
//!     → response.rs (HandlerResponse → axum Response, body streamed)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
