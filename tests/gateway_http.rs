//! End-to-end tests through the HTTP host adapter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use app_gateway::config::GatewayConfig;
use app_gateway::handler::{GatewayHandlerFactory, HandlerFactory, HandlerRequest};
use app_gateway::http::HttpServer;
use app_gateway::lifecycle::Shutdown;
use app_gateway::protocol::frame::code;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

mod common;
use common::{frame, gateway_config, start_mock_backend, unreachable_addr, Mode};

struct RunningGateway {
    addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let factory = Arc::new(GatewayHandlerFactory::new(&config).await.unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, factory);
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningGateway { addr, shutdown, task }
}

#[tokio::test]
async fn get_is_forwarded_and_tagged_with_request_id() {
    let backend = start_mock_backend(Mode::Echo).await;
    let gateway = start_gateway(gateway_config(&[backend.addr], 2)).await;

    let response = reqwest::get(format!("http://{}/orders/42?verbose=1", gateway.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-echo-uri"], "/orders/42?verbose=1");

    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!request_id.is_empty());
    assert_eq!(response.headers()["x-echo-request-id"], request_id.as_str());
    assert_eq!(response.text().await.unwrap(), "GET /orders/42?verbose=1");
}

#[tokio::test]
async fn post_body_is_forwarded() {
    let backend = start_mock_backend(Mode::Echo).await;
    let gateway = start_gateway(gateway_config(&[backend.addr], 2)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/submit", gateway.addr))
        .body("name=value&other=thing")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-echo-method"], "POST");
    assert_eq!(response.text().await.unwrap(), "name=value&other=thing");
}

#[tokio::test]
async fn client_address_is_forwarded() {
    let backend = start_mock_backend(Mode::Echo).await;
    let gateway = start_gateway(gateway_config(&[backend.addr], 2)).await;

    let response = reqwest::get(format!("http://{}/", gateway.addr)).await.unwrap();
    let client = response.headers()["x-echo-client"].to_str().unwrap();
    assert!(client.starts_with("127.0.0.1:"), "client {client}");
}

#[tokio::test]
async fn streamed_response_arrives_complete() {
    let backend = start_mock_backend(Mode::Stream {
        count: 8,
        size: 4096,
        delay: Duration::from_millis(5),
    })
    .await;
    let gateway = start_gateway(gateway_config(&[backend.addr], 2)).await;

    let body = reqwest::get(format!("http://{}/download", gateway.addr))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.len(), 8 * 4096);
    assert!(body.iter().all(|b| *b == b'x'));
}

#[tokio::test]
async fn unreachable_backend_returns_bad_gateway() {
    let mut config = gateway_config(&[unreachable_addr().await], 2);
    config.pool.prewarm = false;
    let gateway = start_gateway(config).await;

    let response = reqwest::get(format!("http://{}/", gateway.addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn graceful_shutdown_stops_server() {
    let backend = start_mock_backend(Mode::Echo).await;
    let gateway = start_gateway(gateway_config(&[backend.addr], 2)).await;

    let response = reqwest::get(format!("http://{}/", gateway.addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    drop(response);

    gateway.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.task)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn factory_always_hands_out_the_same_handler() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let first = factory.get_handler();
    let second = factory.get_handler();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(factory.is_reusable());

    factory.release_handler(first);
    let third = factory.get_handler();
    assert!(Arc::ptr_eq(&second, &third));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_concurrent_requests_get_independent_responses() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = Arc::new(
        GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 4))
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for i in 0..8 {
        let handler = factory.get_handler();
        tasks.push(tokio::spawn(async move {
            let request = HandlerRequest::new(Method::POST, "/same")
                .with_body(app_gateway::handler::RequestBody::full(format!("payload-{i}")));
            handler.process(request).await.collect().await.unwrap()
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("payload-{i}"));
    }
}

#[tokio::test]
async fn hop_by_hop_headers_are_not_forwarded() {
    let backend = start_mock_backend(Mode::Echo).await;
    let factory = GatewayHandlerFactory::new(&gateway_config(&[backend.addr], 2))
        .await
        .unwrap();

    let request = HandlerRequest::new(Method::GET, "/headers")
        .with_header(
            HeaderName::from_static("connection"),
            HeaderValue::from_static("x-private"),
        )
        .with_header(HeaderName::from_static("x-private"), HeaderValue::from_static("secret"))
        .with_header(HeaderName::from_static("x-custom"), HeaderValue::from_static("kept"))
        .with_translated_path("/srv/www/headers")
        .with_remote_addr("10.0.0.7:5000".parse().unwrap());

    let response = factory.get_handler().process(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-echo-translated"], "/srv/www/headers");
    assert_eq!(response.headers()["x-echo-client"], "10.0.0.7:5000");

    let seen = backend.last_request().unwrap();
    assert_eq!(seen.header("x-custom"), Some("kept"));
    assert_eq!(seen.header("connection"), None);
    assert_eq!(seen.header("x-private"), None);
}

#[tokio::test]
async fn backend_connection_listed_headers_are_not_returned() {
    let backend = start_mock_backend(Mode::Frames(vec![
        frame(code::STATUS, "200"),
        frame(code::HEADER_NAME, "connection"),
        frame(code::HEADER_VALUE, "x-backend-private"),
        frame(code::HEADER_NAME, "x-backend-private"),
        frame(code::HEADER_VALUE, "secret"),
        frame(code::HEADER_NAME, "x-kept"),
        frame(code::HEADER_VALUE, "yes"),
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
    assert_eq!(response.headers()["x-kept"], "yes");
    assert!(response.headers().get("connection").is_none());
    assert!(response.headers().get("x-backend-private").is_none());
}

#[tokio::test]
async fn streaming_response_counts_against_in_flight_limit() {
    let backend = start_mock_backend(Mode::Stream {
        count: 20,
        size: 512,
        delay: Duration::from_millis(20),
    })
    .await;
    let mut config = gateway_config(&[backend.addr], 2);
    config.listener.max_connections = 1;
    let gateway = start_gateway(config).await;

    // Head received, body still streaming.
    let streaming = reqwest::get(format!("http://{}/download", gateway.addr))
        .await
        .unwrap();
    assert_eq!(streaming.status(), reqwest::StatusCode::OK);

    let rejected = reqwest::get(format!("http://{}/other", gateway.addr))
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(streaming.bytes().await.unwrap().len(), 20 * 512);

    let admitted = reqwest::get(format!("http://{}/other", gateway.addr))
        .await
        .unwrap();
    assert_eq!(admitted.status(), reqwest::StatusCode::OK);
}
