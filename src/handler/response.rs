//! Response model handed back to the host.

use std::fmt;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};

use crate::error::{client_closed_request, GatewayError, GatewayResult};

/// Response body, produced incrementally when it comes from a backend.
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, GatewayResult<Bytes>>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct HandlerResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    client_abort: bool,
}

impl HandlerResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            client_abort: false,
        }
    }

    /// The client is gone; the host must not write anything.
    pub fn client_abort() -> Self {
        Self {
            client_abort: true,
            ..Self::new(client_closed_request())
        }
    }

    /// Short plain-text response for a failed request.
    pub fn from_error(error: &GatewayError) -> Self {
        if matches!(error, GatewayError::ClientAbort(_)) {
            return Self::client_abort();
        }
        let status = error.status_code();
        let message = format!(
            "{} {}\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body(ResponseBody::Full(Bytes::from(message)))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn is_client_abort(&self) -> bool {
        self.client_abort
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Drain the body into one buffer.
    pub async fn collect(self) -> GatewayResult<Bytes> {
        match self.body {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}
