//! The reusable request handler.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::error::{GatewayError, GatewayResult};
use crate::forward::{ForwardState, RequestForwarder};
use crate::handler::{HandlerRequest, HandlerResponse, RequestHandler};
use crate::observability::metrics;
use crate::pool::ConnectionPool;

/// Handler shared by every request for the life of its factory.
///
/// Holds only the pool and the forwarder. Everything a request owns (the lease,
/// the body streams) lives in the `process` future or in the returned response,
/// so any number of calls may run at once on the same instance.
#[derive(Debug)]
pub struct SharedHandler {
    pool: Arc<ConnectionPool>,
    forwarder: RequestForwarder,
}

impl SharedHandler {
    pub(crate) fn new(pool: Arc<ConnectionPool>, forwarder: RequestForwarder) -> Self {
        Self { pool, forwarder }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Forward one request and map any failure to a response.
    pub async fn process(&self, request: HandlerRequest) -> HandlerResponse {
        let started = Instant::now();
        let method = request.method().clone();
        let span = tracing::info_span!(
            "request",
            request_id = %request.request_id().unwrap_or("-"),
            method = %method,
            path = %request.path(),
        );

        async move {
            let response = match self.try_process(request).await {
                Ok(response) => response,
                Err(e) => {
                    log_failure(&e);
                    HandlerResponse::from_error(&e)
                }
            };
            metrics::record_request(method.as_str(), response.status().as_u16(), started);
            tracing::debug!(
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Response head ready"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn try_process(&self, request: HandlerRequest) -> GatewayResult<HandlerResponse> {
        tracing::trace!(state = %ForwardState::AcquiringConnection, "Forward state");
        let lease = self.pool.checkout().await?;
        tracing::debug!(
            endpoint = %lease.endpoint(),
            connection_id = %lease.id(),
            "Connection leased"
        );
        self.forwarder.forward(request, lease).await
    }
}

fn log_failure(error: &GatewayError) {
    match error {
        GatewayError::ClientAbort(_) => {
            tracing::debug!(error = %error, "Client went away")
        }
        GatewayError::InvalidRequest(_) => {
            tracing::info!(error = %error, "Rejected request")
        }
        _ => tracing::warn!(error = %error, kind = error.kind(), "Forwarding failed"),
    }
}

impl RequestHandler for SharedHandler {
    fn process(
        &self,
        request: HandlerRequest,
    ) -> impl std::future::Future<Output = HandlerResponse> + Send {
        SharedHandler::process(self, request)
    }
}
