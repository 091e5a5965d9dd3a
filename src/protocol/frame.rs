//! Default tagged-frame codec.
//!
//! Every frame is `[code: u8][len: u16 big-endian][payload: len bytes]`.
//!
//! Request: `m` method, `U` uri, `T` translated path, `c` client address,
//! `H`/`S` header name/value pairs, `D` body chunks, `Q` end.
//!
//! Response: `s` status, `H`/`S` header pairs, `D` body chunks, then `Q`
//! (channel reusable) or `X` (backend closes the channel).

use axum::http::{HeaderName, HeaderValue, StatusCode};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::{ProtocolError, RequestHead, ResponseFrame, WireCodec};

/// Frame codes.
pub mod code {
    pub const METHOD: u8 = b'm';
    pub const URI: u8 = b'U';
    pub const TRANSLATED_PATH: u8 = b'T';
    pub const REMOTE_ADDR: u8 = b'c';
    pub const HEADER_NAME: u8 = b'H';
    pub const HEADER_VALUE: u8 = b'S';
    pub const STATUS: u8 = b's';
    pub const DATA: u8 = b'D';
    pub const END: u8 = b'Q';
    pub const EXIT: u8 = b'X';
}

/// Bytes preceding every payload.
pub const FRAME_HEADER_LEN: usize = 3;

/// Largest payload one frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// A frame with its payload, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub code: u8,
    pub payload: Bytes,
}

/// Length of the complete frame starting at `offset`, if it is fully buffered.
fn complete_frame_len(src: &[u8], offset: usize) -> Option<usize> {
    let header = src.get(offset..offset + FRAME_HEADER_LEN)?;
    let len = FRAME_HEADER_LEN + u16::from_be_bytes([header[1], header[2]]) as usize;
    if src.len() >= offset + len {
        Some(len)
    } else {
        None
    }
}

/// Split one complete frame off the front of `src`.
pub fn decode_raw(src: &mut BytesMut) -> Option<RawFrame> {
    let total = complete_frame_len(src, 0)?;
    let code = src[0];
    src.advance(FRAME_HEADER_LEN);
    let payload = src.split_to(total - FRAME_HEADER_LEN).freeze();
    Some(RawFrame { code, payload })
}

/// Append one frame, rejecting payloads that do not fit.
pub fn put_frame(
    code: u8,
    payload: &[u8],
    field: &'static str,
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            field,
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(FRAME_HEADER_LEN + payload.len());
    dst.put_u8(code);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

fn parse_status(payload: &[u8]) -> Result<StatusCode, ProtocolError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::InvalidStatus(format!("{:?}", payload)))?;
    let digits = text.split(' ').next().unwrap_or_default();
    if digits.len() != 3 {
        return Err(ProtocolError::InvalidStatus(text.to_string()));
    }
    digits
        .parse::<u16>()
        .ok()
        .and_then(|n| StatusCode::from_u16(n).ok())
        .ok_or_else(|| ProtocolError::InvalidStatus(text.to_string()))
}

/// The built-in [`WireCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_header(&self, src: &mut BytesMut, name_len: usize) -> Result<Option<ResponseFrame>, ProtocolError> {
        if complete_frame_len(src, name_len).is_none() {
            return Ok(None);
        }
        let value_code = src[name_len];
        if value_code != code::HEADER_VALUE {
            return Err(ProtocolError::UnexpectedFrame {
                code: value_code as char,
                context: "expecting a header value",
            });
        }

        let (Some(name), Some(value)) = (decode_raw(src), decode_raw(src)) else {
            return Ok(None);
        };
        let name = HeaderName::from_bytes(&name.payload)
            .map_err(|e| ProtocolError::InvalidHeader(format!("name: {}", e)))?;
        let value = HeaderValue::from_bytes(&value.payload)
            .map_err(|e| ProtocolError::InvalidHeader(format!("{}: {}", name, e)))?;
        Ok(Some(ResponseFrame::Header(name, value)))
    }
}

impl WireCodec for FrameCodec {
    fn encode_head(&self, head: &RequestHead<'_>, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        put_frame(code::METHOD, head.method.as_str().as_bytes(), "method", dst)?;
        put_frame(code::URI, head.path.as_bytes(), "uri", dst)?;
        if let Some(translated) = head.translated_path {
            put_frame(code::TRANSLATED_PATH, translated.as_bytes(), "translated path", dst)?;
        }
        if let Some(addr) = head.remote_addr {
            put_frame(code::REMOTE_ADDR, addr.to_string().as_bytes(), "client address", dst)?;
        }
        for (name, value) in head.headers {
            put_frame(code::HEADER_NAME, name.as_str().as_bytes(), "header name", dst)?;
            put_frame(code::HEADER_VALUE, value.as_bytes(), "header value", dst)?;
        }
        Ok(())
    }

    fn encode_body_chunk(&self, chunk: &[u8], dst: &mut BytesMut) {
        for part in chunk.chunks(MAX_PAYLOAD) {
            dst.reserve(FRAME_HEADER_LEN + part.len());
            dst.put_u8(code::DATA);
            dst.put_u16(part.len() as u16);
            dst.put_slice(part);
        }
    }

    fn encode_end(&self, dst: &mut BytesMut) {
        dst.put_u8(code::END);
        dst.put_u16(0);
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<ResponseFrame>, ProtocolError> {
        let Some(first_len) = complete_frame_len(src, 0) else {
            return Ok(None);
        };
        if src[0] == code::HEADER_NAME {
            return self.decode_header(src, first_len);
        }

        let Some(frame) = decode_raw(src) else {
            return Ok(None);
        };
        match frame.code {
            code::STATUS => parse_status(&frame.payload).map(|s| Some(ResponseFrame::Status(s))),
            code::DATA => Ok(Some(ResponseFrame::Data(frame.payload))),
            code::END => Ok(Some(ResponseFrame::End { keep_alive: true })),
            code::EXIT => Ok(Some(ResponseFrame::End { keep_alive: false })),
            code::HEADER_VALUE => Err(ProtocolError::UnexpectedFrame {
                code: 'S',
                context: "reading an orphan header value",
            }),
            other => Err(ProtocolError::UnknownFrame(other)),
        }
    }
}
