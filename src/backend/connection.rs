//! A single channel to an application server.
//!
//! # Responsibilities
//! - Open the TCP stream with a connect deadline
//! - Write encoded request bytes and read decoded response frames, each under the I/O deadline
//! - Track liveness and idle age for the pool
//!
//! # Design Decisions
//! - Any I/O failure, timeout or decode error flips `healthy` off; the pool never reuses it
//! - Read bytes are buffered per connection so a frame split across reads survives

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::backend::Endpoint;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{ProtocolError, ResponseFrame, WireCodec};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const READ_CHUNK: usize = 8 * 1024;

/// Unique identifier for a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One open channel to one endpoint. Owned exclusively by the pool or a lease.
#[derive(Debug)]
pub struct BackendConnection {
    id: ConnectionId,
    endpoint: Arc<str>,
    address: Arc<str>,
    stream: TcpStream,
    read_buf: BytesMut,
    healthy: bool,
    in_use: bool,
    last_used: Instant,
}

impl BackendConnection {
    /// Open a connection, bounded by `connect_timeout`.
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint.address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {}ms", connect_timeout.as_millis()),
                )
            })??;
        stream.set_nodelay(true)?;

        let now = Instant::now();
        let conn = Self {
            id: ConnectionId::new(),
            endpoint: Arc::from(endpoint.name.as_str()),
            address: Arc::from(endpoint.address.as_str()),
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            healthy: true,
            in_use: false,
            last_used: now,
        };
        tracing::debug!(
            endpoint = %conn.endpoint,
            connection_id = %conn.id,
            address = %conn.address,
            "Backend connection opened"
        );
        Ok(conn)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
        self.last_used = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Idle longer than `idle_timeout`.
    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() >= idle_timeout
    }

    /// Non-blocking check that the peer has not closed or written unsolicited bytes.
    pub fn probe_alive(&self) -> bool {
        if !self.healthy || !self.read_buf.is_empty() {
            return false;
        }
        let mut scratch = [0u8; 1];
        match self.stream.try_read(&mut scratch) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Ok(_) | Err(_) => false,
        }
    }

    /// Write all of `buf`, bounded by `io_timeout`.
    pub async fn write_all(&mut self, buf: &[u8], io_timeout: Duration) -> GatewayResult<()> {
        let result = match tokio::time::timeout(io_timeout, self.stream.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::Protocol(ProtocolError::Io(e.to_string()))),
            Err(_) => Err(GatewayError::BackendIoTimeout {
                operation: "write",
                timeout_ms: io_timeout.as_millis() as u64,
            }),
        };
        if result.is_err() {
            self.healthy = false;
        }
        result
    }

    /// Read until one complete response frame is decoded.
    ///
    /// `context` names the exchange phase for truncation errors.
    pub async fn read_frame(
        &mut self,
        codec: &dyn WireCodec,
        io_timeout: Duration,
        context: &'static str,
    ) -> GatewayResult<ResponseFrame> {
        let result = self.read_frame_inner(codec, io_timeout, context).await;
        if result.is_err() {
            self.healthy = false;
        }
        result
    }

    async fn read_frame_inner(
        &mut self,
        codec: &dyn WireCodec,
        io_timeout: Duration,
        context: &'static str,
    ) -> GatewayResult<ResponseFrame> {
        loop {
            if let Some(frame) = codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }

            self.read_buf.reserve(READ_CHUNK);
            let read = tokio::time::timeout(io_timeout, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| GatewayError::BackendIoTimeout {
                    operation: "read",
                    timeout_ms: io_timeout.as_millis() as u64,
                })?
                .map_err(|e| ProtocolError::Io(e.to_string()))?;

            if read == 0 {
                return Err(ProtocolError::Truncated(context).into());
            }
        }
    }
}
