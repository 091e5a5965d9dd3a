//! Host-supplied request model.

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

/// Error surfaced by a host request body stream.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Declared size of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// Exactly this many bytes must be streamed.
    Known(u64),
    /// Length unknown until the stream ends.
    Chunked,
}

/// A finite request body stream.
pub struct RequestBody {
    length: BodyLength,
    stream: BoxStream<'static, Result<Bytes, BodyError>>,
}

impl RequestBody {
    pub fn empty() -> Self {
        Self {
            length: BodyLength::Known(0),
            stream: stream::empty().boxed(),
        }
    }

    /// A fully buffered body of known length.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        Self {
            length: BodyLength::Known(bytes.len() as u64),
            stream: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    pub fn from_stream<S>(length: BodyLength, stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self {
            length,
            stream: stream.boxed(),
        }
    }

    pub fn length(&self) -> BodyLength {
        self.length
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, BodyError>> {
        self.stream
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Request head handed to the forwarder once the body is split off.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub path: String,
    pub translated_path: Option<String>,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

/// One HTTP request as received from the host. Immutable once built.
#[derive(Debug)]
pub struct HandlerRequest {
    parts: RequestParts,
    body: RequestBody,
}

impl HandlerRequest {
    /// A bodiless request for `path` (path and query).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            parts: RequestParts {
                method,
                path: path.into(),
                translated_path: None,
                headers: HeaderMap::new(),
                remote_addr: None,
            },
            body: RequestBody::empty(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.parts.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.parts.headers = headers;
        self
    }

    pub fn with_translated_path(mut self, translated_path: impl Into<String>) -> Self {
        self.parts.translated_path = Some(translated_path.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.parts.remote_addr = Some(addr);
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn path(&self) -> &str {
        &self.parts.path
    }

    pub fn translated_path(&self) -> Option<&str> {
        self.parts.translated_path.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.parts.remote_addr
    }

    pub fn body_length(&self) -> BodyLength {
        self.body.length()
    }

    /// Value of `x-request-id`, if the host set one.
    pub fn request_id(&self) -> Option<&str> {
        self.parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
    }

    pub fn into_parts(self) -> (RequestParts, RequestBody) {
        (self.parts, self.body)
    }
}
