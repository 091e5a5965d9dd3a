//! Backend wire protocol.
//!
//! # Data Flow
//! ```text
//! HandlerRequest
//!     → WireCodec::encode_head / encode_body_chunk / encode_end
//!     → bytes written to a pooled BackendConnection
//!
//! bytes read from the BackendConnection
//!     → WireCodec::decode (incremental, one ResponseFrame at a time)
//!     → forwarder assembles status, headers, body stream
//! ```
//!
//! # Design Decisions
//! - Framing sits behind a trait so a byte-compatible codec can replace the default
//! - Decoding is incremental over a `BytesMut`; partial frames stay buffered
//! - Frame ordering is enforced by the forwarder, which knows the exchange state

pub mod error;
pub mod frame;

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::{Bytes, BytesMut};

pub use error::ProtocolError;
pub use frame::FrameCodec;

/// Borrowed view of everything that precedes the request body.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub translated_path: Option<&'a str>,
    pub remote_addr: Option<SocketAddr>,
    pub headers: &'a HeaderMap,
}

/// One decoded unit of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    Status(StatusCode),
    Header(HeaderName, HeaderValue),
    Data(Bytes),
    /// Exchange finished. `keep_alive` is false when the backend will close the channel.
    End { keep_alive: bool },
}

impl ResponseFrame {
    /// Code this frame carries in the default framing, used in error reports.
    pub fn code(&self) -> char {
        match self {
            ResponseFrame::Status(_) => 's',
            ResponseFrame::Header(..) => 'H',
            ResponseFrame::Data(_) => 'D',
            ResponseFrame::End { keep_alive: true } => 'Q',
            ResponseFrame::End { keep_alive: false } => 'X',
        }
    }
}

/// Encoding between the gateway and an application server.
pub trait WireCodec: Send + Sync + fmt::Debug + 'static {
    /// Append the request head to `dst`.
    fn encode_head(&self, head: &RequestHead<'_>, dst: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Append one body chunk, splitting it if the framing requires.
    fn encode_body_chunk(&self, chunk: &[u8], dst: &mut BytesMut);

    /// Append the end-of-request marker.
    fn encode_end(&self, dst: &mut BytesMut);

    /// Decode the next response frame, or `Ok(None)` if more bytes are needed.
    fn decode(&self, src: &mut BytesMut) -> Result<Option<ResponseFrame>, ProtocolError>;
}
