//! Host response conversion.
//!
//! # Design Decisions
//! - Streaming bodies pass straight through; hyper polls them as the client reads
//! - A client-abort response carries a body that fails on first poll, so hyper
//!   tears the connection down instead of writing a payload

use std::io;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;

use crate::handler::{HandlerResponse, ResponseBody};

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        if self.is_client_abort() {
            let aborted = stream::once(async {
                Err::<Bytes, _>(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "client closed request",
                ))
            });
            let mut response = Response::new(Body::from_stream(aborted));
            *response.status_mut() = self.status();
            return response;
        }

        let (status, headers, body) = self.into_parts();
        let body = match body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(stream) => Body::from_stream(stream),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
