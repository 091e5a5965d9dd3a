//! Host-facing handler factory.

use std::future::Future;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::forward::RequestForwarder;
use crate::handler::{HandlerRequest, HandlerResponse, SharedHandler};
use crate::pool::ConnectionPool;
use crate::protocol::{FrameCodec, WireCodec};

/// Something that turns one host request into one response.
pub trait RequestHandler: Send + Sync {
    fn process(&self, request: HandlerRequest) -> impl Future<Output = HandlerResponse> + Send;
}

/// Provider the host asks for a handler on every request.
pub trait HandlerFactory: Send + Sync {
    type Handler: RequestHandler;

    /// The handler to use for the next request.
    fn get_handler(&self) -> Arc<Self::Handler>;

    /// Called by the host once a request is done with `handler`.
    fn release_handler(&self, handler: Arc<Self::Handler>);

    /// Whether the host may keep using handlers across requests.
    fn is_reusable(&self) -> bool;
}

/// Factory that owns the connection pool and hands out one [`SharedHandler`].
#[derive(Debug)]
pub struct GatewayHandlerFactory {
    handler: Arc<SharedHandler>,
    pool: Arc<ConnectionPool>,
}

impl GatewayHandlerFactory {
    /// Build the pool and the handler, prewarming unless `pool.prewarm` is off.
    ///
    /// Fails with `Connectivity` if prewarming cannot reach any endpoint.
    pub async fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::with_codec(config, Arc::new(FrameCodec::new())).await
    }

    pub async fn with_codec(config: &GatewayConfig, codec: Arc<dyn WireCodec>) -> GatewayResult<Self> {
        let pool = Arc::new(ConnectionPool::new(config));
        if config.pool.prewarm {
            pool.prewarm().await?;
        }

        let forwarder = RequestForwarder::new(codec, config.timeouts.io());
        let handler = Arc::new(SharedHandler::new(Arc::clone(&pool), forwarder));

        tracing::info!(
            endpoints = pool.endpoints().len(),
            prewarmed = config.pool.prewarm,
            "Handler factory ready"
        );
        Ok(Self { handler, pool })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Close the pool. Handlers already handed out answer 503 from now on.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

impl HandlerFactory for GatewayHandlerFactory {
    type Handler = SharedHandler;

    fn get_handler(&self) -> Arc<SharedHandler> {
        Arc::clone(&self.handler)
    }

    fn release_handler(&self, _handler: Arc<SharedHandler>) {}

    fn is_reusable(&self) -> bool {
        true
    }
}
