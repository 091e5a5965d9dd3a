//! Shared utilities for integration tests.
//!
//! The mock backend speaks the default frame protocol over loopback.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use app_gateway::config::{BackendConfig, GatewayConfig};
use app_gateway::protocol::frame::{code, decode_raw, put_frame};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the mock answers each request.
#[derive(Debug, Clone)]
pub enum Mode {
    /// 200 with request details in `x-echo-*` headers; body echoes the request body.
    Echo,
    /// Echo after a delay.
    Slow(Duration),
    /// Status, one body chunk, then the socket closes.
    TruncateBody,
    /// An unknown frame code instead of a response.
    Garbage,
    /// Read the request and never answer.
    Silent,
    /// Echo, ending with the exit frame, then close.
    Exit,
    /// Echo with keep-alive, then close the socket while it sits idle.
    HangUp,
    /// `count` body chunks of `size` bytes, `delay` apart.
    Stream { count: usize, size: usize, delay: Duration },
    /// Exactly these `(code, payload)` frames, in order.
    Frames(Vec<(u8, Vec<u8>)>),
}

/// A request as the mock decoded it.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub method: String,
    pub uri: String,
    pub translated_path: Option<String>,
    pub client_addr: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    /// Connections accepted so far.
    pub accepted: Arc<AtomicUsize>,
    /// Requests currently being answered.
    pub active: Arc<AtomicUsize>,
    /// Highest `active` value observed.
    pub peak: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockBackend {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<MockRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Start a mock backend on an ephemeral loopback port.
pub async fn start_mock_backend(mode: Mode) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        accepted: Arc::new(AtomicUsize::new(0)),
        active: Arc::new(AtomicUsize::new(0)),
        peak: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let shared = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let conn_seq = shared.accepted.fetch_add(1, Ordering::SeqCst) + 1;
            let shared = shared.clone();
            let mode = mode.clone();
            tokio::spawn(async move {
                serve_connection(socket, conn_seq, mode, shared).await;
            });
        }
    });

    backend
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A `(code, payload)` frame for [`Mode::Frames`].
pub fn frame(code: u8, payload: &str) -> (u8, Vec<u8>) {
    (code, payload.as_bytes().to_vec())
}

/// Gateway config for `addrs` with short timeouts suitable for tests.
pub fn gateway_config(addrs: &[SocketAddr], max_connections: usize) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backends = addrs
        .iter()
        .enumerate()
        .map(|(i, addr)| BackendConfig {
            name: format!("app-{i}"),
            address: addr.to_string(),
            max_connections,
        })
        .collect();
    config.pool.acquire_timeout_ms = 2_000;
    config.pool.connect_retries = 1;
    config.pool.retry_base_delay_ms = 10;
    config.pool.retry_max_delay_ms = 20;
    config.timeouts.connect_ms = 500;
    config.timeouts.io_ms = 2_000;
    config
}

async fn serve_connection(mut socket: TcpStream, conn_seq: usize, mode: Mode, shared: MockBackend) {
    let mut buf = BytesMut::new();
    while let Some(request) = read_request(&mut socket, &mut buf).await {
        let in_flight = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak.fetch_max(in_flight, Ordering::SeqCst);
        shared.requests.lock().unwrap().push(request.clone());

        let keep_open = respond(&mut socket, conn_seq, &mode, &request).await;
        shared.active.fetch_sub(1, Ordering::SeqCst);
        if !keep_open {
            return;
        }
    }
}

/// Returns whether the socket stays open for another request.
async fn respond(socket: &mut TcpStream, conn_seq: usize, mode: &Mode, request: &MockRequest) -> bool {
    let mut out = BytesMut::new();
    match mode {
        Mode::Echo | Mode::Exit | Mode::HangUp => {
            echo(&mut out, conn_seq, request);
            end(&mut out, !matches!(mode, Mode::Exit));
        }
        Mode::Slow(delay) => {
            tokio::time::sleep(*delay).await;
            echo(&mut out, conn_seq, request);
            end(&mut out, true);
        }
        Mode::TruncateBody => {
            put_frame(code::STATUS, b"200", "status", &mut out).unwrap();
            put_frame(code::DATA, b"partial", "data", &mut out).unwrap();
            let _ = socket.write_all(&out).await;
            return false;
        }
        Mode::Garbage => {
            out.extend_from_slice(&[b'z', 0, 0]);
            let _ = socket.write_all(&out).await;
            return false;
        }
        Mode::Silent => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return false;
        }
        Mode::Stream { count, size, delay } => {
            put_frame(code::STATUS, b"200", "status", &mut out).unwrap();
            if socket.write_all(&out).await.is_err() {
                return false;
            }
            for _ in 0..*count {
                out.clear();
                put_frame(code::DATA, &vec![b'x'; *size], "data", &mut out).unwrap();
                if socket.write_all(&out).await.is_err() {
                    return false;
                }
                tokio::time::sleep(*delay).await;
            }
            out.clear();
            end(&mut out, true);
        }
        Mode::Frames(frames) => {
            for (frame, payload) in frames {
                put_frame(*frame, payload, "frame", &mut out).unwrap();
            }
        }
    }

    if socket.write_all(&out).await.is_err() {
        return false;
    }
    match mode {
        Mode::Exit => false,
        Mode::HangUp => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            false
        }
        _ => true,
    }
}

fn echo(out: &mut BytesMut, conn_seq: usize, request: &MockRequest) {
    put_frame(code::STATUS, b"200", "status", out).unwrap();
    let mut header = |name: &str, value: &str| {
        put_frame(code::HEADER_NAME, name.as_bytes(), "name", out).unwrap();
        put_frame(code::HEADER_VALUE, value.as_bytes(), "value", out).unwrap();
    };
    header("content-type", "application/octet-stream");
    header("x-echo-method", &request.method);
    header("x-echo-uri", &request.uri);
    header("x-echo-conn", &conn_seq.to_string());
    if let Some(translated) = &request.translated_path {
        header("x-echo-translated", translated);
    }
    if let Some(client) = &request.client_addr {
        header("x-echo-client", client);
    }
    if let Some(id) = request.header("x-request-id") {
        header("x-echo-request-id", id);
    }

    let body = if request.body.is_empty() {
        format!("{} {}", request.method, request.uri).into_bytes()
    } else {
        request.body.clone()
    };
    for chunk in body.chunks(16 * 1024) {
        put_frame(code::DATA, chunk, "data", out).unwrap();
    }
}

fn end(out: &mut BytesMut, keep_alive: bool) {
    let frame = if keep_alive { code::END } else { code::EXIT };
    put_frame(frame, b"", "end", out).unwrap();
}

async fn read_request(socket: &mut TcpStream, buf: &mut BytesMut) -> Option<MockRequest> {
    let mut request = MockRequest::default();
    let mut pending_name: Option<String> = None;

    loop {
        while let Some(frame) = decode_raw(buf) {
            let text = String::from_utf8_lossy(&frame.payload).into_owned();
            match frame.code {
                code::METHOD => request.method = text,
                code::URI => request.uri = text,
                code::TRANSLATED_PATH => request.translated_path = Some(text),
                code::REMOTE_ADDR => request.client_addr = Some(text),
                code::HEADER_NAME => pending_name = Some(text),
                code::HEADER_VALUE => {
                    if let Some(name) = pending_name.take() {
                        request.headers.push((name, text));
                    }
                }
                code::DATA => request.body.extend_from_slice(&frame.payload),
                code::END => return Some(request),
                _ => return None,
            }
        }

        match socket.read_buf(buf).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
