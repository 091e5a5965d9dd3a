//! Lazy response body backed by a leased connection.
//!
//! Frames are read only when the host polls the stream. The lease lives inside
//! the stream state: an end frame releases it, an error or a drop of the stream
//! discards it.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{GatewayError, GatewayResult};
use crate::forward::state::{ForwardState, Progress};
use crate::pool::PooledConnection;
use crate::protocol::{ProtocolError, ResponseFrame, WireCodec};

struct BodyState {
    lease: Option<PooledConnection>,
    codec: Arc<dyn WireCodec>,
    io_timeout: Duration,
    pending: Option<Bytes>,
    progress: Progress,
}

impl BodyState {
    async fn next_chunk(&mut self) -> Option<GatewayResult<Bytes>> {
        loop {
            let lease = self.lease.as_mut()?;
            match lease.read_frame(&*self.codec, self.io_timeout, "mid-body").await {
                Ok(ResponseFrame::Data(chunk)) if chunk.is_empty() => continue,
                Ok(ResponseFrame::Data(chunk)) => return Some(Ok(chunk)),
                Ok(ResponseFrame::End { keep_alive }) => {
                    self.progress.advance(ForwardState::Done);
                    if let Some(lease) = self.lease.take() {
                        lease.release(keep_alive);
                    }
                    return None;
                }
                Ok(other) => {
                    let error = ProtocolError::UnexpectedFrame {
                        code: other.code(),
                        context: "streaming the body",
                    };
                    return Some(Err(self.abort(error.into())));
                }
                Err(e) => return Some(Err(self.abort(e))),
            }
        }
    }

    fn abort(&mut self, error: GatewayError) -> GatewayError {
        self.progress.fail();
        if let Some(lease) = self.lease.take() {
            tracing::warn!(
                endpoint = %lease.endpoint(),
                connection_id = %lease.id(),
                error = %error,
                "Backend response body failed"
            );
            lease.release(!error.poisons_connection());
        }
        error
    }
}

/// Stream the rest of a response body, starting with `first` (already read).
pub fn response_stream(
    lease: PooledConnection,
    codec: Arc<dyn WireCodec>,
    io_timeout: Duration,
    first: Bytes,
    progress: Progress,
) -> BoxStream<'static, GatewayResult<Bytes>> {
    let state = BodyState {
        lease: Some(lease),
        codec,
        io_timeout,
        pending: Some(first).filter(|chunk| !chunk.is_empty()),
        progress,
    };

    stream::unfold(state, |mut state| async move {
        if let Some(chunk) = state.pending.take() {
            return Some((Ok(chunk), state));
        }
        let item = state.next_chunk().await?;
        Some((item, state))
    })
    .boxed()
}
