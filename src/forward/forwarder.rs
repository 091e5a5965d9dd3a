//! Request translation between the host model and the backend codec.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::error::{GatewayError, GatewayResult};
use crate::forward::body::response_stream;
use crate::forward::state::{ForwardState, Progress};
use crate::handler::{BodyLength, HandlerRequest, HandlerResponse, RequestBody, ResponseBody};
use crate::pool::PooledConnection;
use crate::protocol::{ProtocolError, RequestHead, ResponseFrame, WireCodec};

/// Headers that describe one transport hop and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy of `headers` without hop-by-hop headers, including those listed in `Connection`.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.iter().any(|t| t == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Sends one request over a leased connection and builds the streaming response.
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    codec: Arc<dyn WireCodec>,
    io_timeout: Duration,
}

impl RequestForwarder {
    pub fn new(codec: Arc<dyn WireCodec>, io_timeout: Duration) -> Self {
        Self { codec, io_timeout }
    }

    /// Forward `request` over `lease`.
    ///
    /// The lease ends up released (backend signalled reuse), discarded, or
    /// moved into the response body stream. It is never sent twice. On error it
    /// goes back to the pool unless the error poisons the connection.
    pub async fn forward(
        &self,
        request: HandlerRequest,
        lease: PooledConnection,
    ) -> GatewayResult<HandlerResponse> {
        let mut progress = Progress::new(lease.id());
        let mut slot = Some(lease);
        match self.exchange(request, &mut slot, &mut progress).await {
            Ok(response) => Ok(response),
            Err(e) => {
                progress.fail();
                if let Some(lease) = slot.take() {
                    lease.release(!e.poisons_connection());
                }
                Err(e)
            }
        }
    }

    /// Runs one exchange. `slot` is emptied once the lease is released or
    /// handed to the body stream.
    async fn exchange(
        &self,
        request: HandlerRequest,
        slot: &mut Option<PooledConnection>,
        progress: &mut Progress,
    ) -> GatewayResult<HandlerResponse> {
        let (parts, body) = request.into_parts();
        let headers = strip_hop_by_hop(&parts.headers);

        let mut buf = BytesMut::new();
        let head = RequestHead {
            method: &parts.method,
            path: &parts.path,
            translated_path: parts.translated_path.as_deref(),
            remote_addr: parts.remote_addr,
            headers: &headers,
        };
        self.codec
            .encode_head(&head, &mut buf)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let lease = leased(slot)?;
        progress.advance(ForwardState::SendingRequest);
        lease.write_all(&buf, self.io_timeout).await?;
        self.send_body(body, lease, &mut buf).await?;
        buf.clear();
        self.codec.encode_end(&mut buf);
        lease.write_all(&buf, self.io_timeout).await?;

        progress.advance(ForwardState::AwaitingResponseHeaders);
        let status = match self.read(lease, "awaiting status").await? {
            ResponseFrame::Status(status) => status,
            other => return Err(unexpected(lease, &other, "awaiting status")),
        };

        let mut headers = HeaderMap::new();
        let first_chunk: Bytes = loop {
            match self.read(lease, "reading headers").await? {
                ResponseFrame::Header(name, value) => {
                    headers.append(name, value);
                }
                ResponseFrame::Data(chunk) => break chunk,
                ResponseFrame::End { keep_alive } => {
                    progress.advance(ForwardState::Done);
                    if let Some(lease) = slot.take() {
                        lease.release(keep_alive);
                    }
                    return Ok(HandlerResponse::new(status).with_headers(strip_hop_by_hop(&headers)));
                }
                other => return Err(unexpected(lease, &other, "reading headers")),
            }
        };
        let headers = strip_hop_by_hop(&headers);

        progress.advance(ForwardState::StreamingBody);
        let lease = slot.take().ok_or_else(lease_gone)?;
        let progress = std::mem::replace(progress, Progress::new(lease.id()));
        let body = response_stream(lease, Arc::clone(&self.codec), self.io_timeout, first_chunk, progress);
        Ok(HandlerResponse::new(status)
            .with_headers(headers)
            .with_body(ResponseBody::Stream(body)))
    }

    async fn send_body(
        &self,
        body: RequestBody,
        lease: &mut PooledConnection,
        buf: &mut BytesMut,
    ) -> GatewayResult<()> {
        let length = body.length();
        let mut stream = body.into_stream();
        let mut sent: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GatewayError::ClientAbort(format!("request body: {e}")))?;
            sent += chunk.len() as u64;
            if let BodyLength::Known(expected) = length {
                if sent > expected {
                    return Err(GatewayError::ClientAbort(format!(
                        "request body exceeds declared {expected} bytes"
                    )));
                }
            }
            if chunk.is_empty() {
                continue;
            }
            buf.clear();
            self.codec.encode_body_chunk(&chunk, buf);
            lease.write_all(buf, self.io_timeout).await?;
        }

        match length {
            BodyLength::Known(expected) if sent != expected => Err(GatewayError::ClientAbort(
                format!("request body ended after {sent} of {expected} bytes"),
            )),
            _ => Ok(()),
        }
    }

    async fn read(
        &self,
        lease: &mut PooledConnection,
        context: &'static str,
    ) -> GatewayResult<ResponseFrame> {
        lease.read_frame(&*self.codec, self.io_timeout, context).await
    }
}

fn leased(slot: &mut Option<PooledConnection>) -> GatewayResult<&mut PooledConnection> {
    slot.as_mut().ok_or_else(lease_gone)
}

fn lease_gone() -> GatewayError {
    ProtocolError::Io("connection lease already returned".to_string()).into()
}

fn unexpected(lease: &mut PooledConnection, frame: &ResponseFrame, context: &'static str) -> GatewayError {
    lease.mark_unhealthy();
    ProtocolError::UnexpectedFrame {
        code: frame.code(),
        context,
    }
    .into()
}
