//! Failure injection tests for the gateway.

use std::io;
use std::time::{Duration, Instant};

use app_gateway::backend::HealthState;
use app_gateway::error::GatewayError;
use app_gateway::handler::{
    BodyError, BodyLength, GatewayHandlerFactory, HandlerFactory, HandlerRequest, RequestBody,
    ResponseBody,
};
use app_gateway::protocol::frame::code;
use app_gateway::protocol::ProtocolError;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::{stream, StreamExt};

mod common;
use common::{frame, gateway_config, start_mock_backend, unreachable_addr, Mode};

#[tokio::test]
async fn factory_fails_when_nothing_is_reachable() {
    let config = gateway_config(&[unreachable_addr().await], 2);
    let err = GatewayHandlerFactory::new(&config).await.unwrap_err();
    assert!(matches!(err, GatewayError::Connectivity { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_returns_bad_gateway() {
    let mut config = gateway_config(&[unreachable_addr().await], 2);
    config.pool.prewarm = false;
    let factory = GatewayHandlerFactory::new(&config).await.unwrap();
    let handler = factory.get_handler();

    let response = handler.process(HandlerRequest::new(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.idle, stats.open), (0, 0, 0));
    assert_eq!(factory.pool().endpoints()[0].state(), HealthState::Dead);

    // Dead endpoint: the next request fails without waiting on connects.
    let started = Instant::now();
    let response = handler.process(HandlerRequest::new(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn fails_over_to_live_endpoint() {
    let live = start_mock_backend(Mode::Echo).await;
    let mut config = gateway_config(&[unreachable_addr().await, live.addr], 2);
    config.pool.prewarm = false;
    let factory = GatewayHandlerFactory::new(&config).await.unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/failover"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.collect().await.unwrap(), "GET /failover");

    let endpoints = factory.pool().endpoints();
    assert_eq!(endpoints[0].state(), HealthState::Dead);
    assert_eq!(endpoints[1].state(), HealthState::Healthy);
}

#[tokio::test]
async fn backend_closing_mid_body_is_a_protocol_error() {
    let backend = start_mock_backend(Mode::TruncateBody).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/big"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = response.collect().await.unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(ProtocolError::Truncated(_))));

    let stats = &factory.pool().stats()[0];
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.open, 0);
}

#[tokio::test]
async fn malformed_response_returns_bad_gateway() {
    let backend = start_mock_backend(Mode::Garbage).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(factory.pool().stats()[0].open, 0);
}

#[tokio::test]
async fn silent_backend_times_out() {
    let backend = start_mock_backend(Mode::Silent).await;
    let mut config = gateway_config(&[backend.addr], 2);
    config.timeouts.io_ms = 100;
    let factory = GatewayHandlerFactory::new(&config).await.unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/"))
        .await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.open), (0, 0));
}

#[tokio::test]
async fn request_body_error_is_a_client_abort() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let chunks: Vec<Result<Bytes, BodyError>> = vec![
        Ok(Bytes::from_static(b"first part")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client reset").into()),
    ];
    let request = HandlerRequest::new(Method::POST, "/upload")
        .with_body(RequestBody::from_stream(BodyLength::Chunked, stream::iter(chunks)));

    let response = factory.get_handler().process(request).await;
    assert!(response.is_client_abort());

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.idle, stats.open), (0, 0, 0));
}

#[tokio::test]
async fn short_known_length_body_is_a_client_abort() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let chunks: Vec<Result<Bytes, BodyError>> = vec![Ok(Bytes::from_static(b"12345"))];
    let request = HandlerRequest::new(Method::PUT, "/doc")
        .with_body(RequestBody::from_stream(BodyLength::Known(10), stream::iter(chunks)));

    let response = factory.get_handler().process(request).await;
    assert!(response.is_client_abort());
    assert_eq!(factory.pool().stats()[0].open, 0);
}

#[tokio::test]
async fn dropping_response_body_discards_connection() {
    let backend = start_mock_backend(Mode::Stream {
        count: 50,
        size: 1024,
        delay: Duration::from_millis(20),
    })
    .await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/stream"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(factory.pool().stats()[0].in_use, 1);

    let (_, _, body) = response.into_parts();
    let ResponseBody::Stream(mut stream) = body else {
        panic!("expected a streaming body");
    };
    let chunk = stream.next().await.unwrap().unwrap();
    assert_eq!(chunk.len(), 1024);
    drop(stream);

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.idle, stats.open), (0, 0, 0));
}

#[tokio::test]
async fn exit_frame_discards_connection() {
    let backend = start_mock_backend(Mode::Exit).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/bye"))
        .await;
    assert_eq!(response.collect().await.unwrap(), "GET /bye");

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.idle, stats.open), (0, 0, 0));
}

#[tokio::test]
async fn oversized_header_is_rejected_without_poisoning() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let huge = HeaderValue::from_str(&"a".repeat(70_000)).unwrap();
    let request = HandlerRequest::new(Method::GET, "/")
        .with_header(HeaderName::from_static("x-huge"), huge);

    let response = factory.get_handler().process(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.idle, stats.open), (0, 1, 1));
}

#[tokio::test]
async fn body_before_status_returns_bad_gateway() {
    let backend = start_mock_backend(Mode::Frames(vec![
        frame(code::DATA, "too early"),
        frame(code::END, ""),
    ]))
    .await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.open), (0, 0));
}

#[tokio::test]
async fn header_after_body_fails_the_stream() {
    let backend = start_mock_backend(Mode::Frames(vec![
        frame(code::STATUS, "200"),
        frame(code::DATA, "hello"),
        frame(code::HEADER_NAME, "x-late"),
        frame(code::HEADER_VALUE, "nope"),
        frame(code::END, ""),
    ]))
    .await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let response = factory
        .get_handler()
        .process(HandlerRequest::new(Method::GET, "/"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = response.collect().await.unwrap_err();
    assert!(
        matches!(err, GatewayError::Protocol(ProtocolError::UnexpectedFrame { code: 'H', .. })),
        "{err}"
    );

    let stats = &factory.pool().stats()[0];
    assert_eq!((stats.in_use, stats.open), (0, 0));
}
