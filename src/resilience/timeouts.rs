//! Deadline enforcement for pool waits.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timed-out acquires become `PoolExhaustedTimeout` (503)

use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Run `fut` under `limit`, mapping expiry to `PoolExhaustedTimeout` for `endpoint`.
pub async fn acquire_within<F, T>(endpoint: &str, limit: Duration, fut: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::PoolExhaustedTimeout {
            endpoint: endpoint.to_string(),
            waited_ms: limit.as_millis() as u64,
        }),
    }
}
