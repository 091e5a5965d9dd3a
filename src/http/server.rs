//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the single gateway handler
//! - Wire up middleware (request timeout, in-flight limit, request ID, tracing)
//! - Serve on a listener until the shutdown broadcast fires

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::handler::{GatewayHandlerFactory, HandlerFactory};
use crate::http::request::into_handler_request;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<GatewayHandlerFactory>,
    pub document_root: Option<Arc<PathBuf>>,
}

/// Host adapter in front of the handler factory.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, factory: Arc<GatewayHandlerFactory>) -> Self {
        let state = AppState {
            factory,
            document_root: config
                .listener
                .document_root
                .as_ref()
                .map(|root| Arc::new(PathBuf::from(root))),
        };
        let router = Self::build_router(&config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let in_flight = Arc::new(Semaphore::new(config.listener.max_connections));

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(middleware::from_fn_with_state(in_flight, limit_in_flight))
                    .layer(TimeoutLayer::new(config.timeouts.request())),
            )
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Reject with 503 once `listener.max_connections` requests are in flight.
///
/// A request counts until its response body has been fully sent or dropped.
async fn limit_in_flight(
    State(in_flight): State<Arc<Semaphore>>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(permit) = in_flight.try_acquire_owned() else {
        tracing::warn!("In-flight request limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many requests in flight\n").into_response();
    };
    let (parts, body) = next.run(request).await.into_parts();
    Response::from_parts(parts, hold_until_sent(body, permit))
}

fn hold_until_sent(body: Body, permit: OwnedSemaphorePermit) -> Body {
    let chunks = stream::unfold(
        (body.into_data_stream(), permit),
        |(mut chunks, permit)| async move {
            let chunk = chunks.next().await?;
            Some((chunk, (chunks, permit)))
        },
    );
    Body::from_stream(chunks)
}

/// Every path and method lands here.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let handler = state.factory.get_handler();
    let request = into_handler_request(request, state.document_root.as_deref().map(|p| p.as_path()));
    let response = handler.process(request).await;
    state.factory.release_handler(handler);
    response.into_response()
}
