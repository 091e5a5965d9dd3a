//! Host request conversion.
//!
//! # Responsibilities
//! - Turn an axum request into a `HandlerRequest`
//! - Derive the body length from `content-length`
//! - Build the translated path from the document root
//!
//! # Design Decisions
//! - Request ID is set by tower-http before this runs, so it is always present
//! - The body is passed through as a stream; nothing is buffered here

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};
use futures_util::TryStreamExt;

use crate::handler::{BodyError, BodyLength, HandlerRequest, RequestBody};

pub const X_REQUEST_ID: &str = "x-request-id";

/// `Known(n)` when `content-length` is present and valid, `Chunked` otherwise.
pub fn body_length(headers: &HeaderMap) -> BodyLength {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(BodyLength::Known)
        .unwrap_or(BodyLength::Chunked)
}

/// Join the URL path onto `root`, dropping `.` and `..` segments.
pub fn translate_path(root: &Path, url_path: &str) -> PathBuf {
    let mut translated = root.to_path_buf();
    for segment in url_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        translated.push(segment);
    }
    translated
}

/// Convert an axum request. `document_root` enables the translated path.
pub fn into_handler_request(request: Request<Body>, document_root: Option<&Path>) -> HandlerRequest {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let length = body_length(&parts.headers);
    let stream = body.into_data_stream().map_err(BodyError::from);

    let mut request = HandlerRequest::new(parts.method, path)
        .with_headers(parts.headers)
        .with_body(RequestBody::from_stream(length, stream));
    if let Some(root) = document_root {
        let translated = translate_path(root, parts.uri.path());
        request = request.with_translated_path(translated.to_string_lossy());
    }
    if let Some(addr) = remote_addr {
        request = request.with_remote_addr(addr);
    }
    request
}
