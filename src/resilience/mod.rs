//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Pool acquire:
//!     → timeouts.rs (bounded wait for a permit)
//!     → On connect failure: backoff.rs (jittered delay, bounded attempts)
//! ```
//!
//! # Design Decisions
//! - Every backend wait has a deadline
//! - Only connects are retried; a forwarded request is sent at most once

pub mod backoff;
pub mod timeouts;
