//! Kind-stamping egress layer.
//!
//! A tower layer over the server's routes. At startup it takes the
//! static method-path → stamp-function table from `stigmer-api`; per
//! request it does one map lookup. For stamped paths the unary response
//! frame is buffered, the message decoded, `api_version`/`kind` set on
//! every metadata envelope, and the frame rebuilt — trailers preserved.
//! Unknown paths and compressed frames pass through untouched.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body::Frame;
use http_body_util::BodyExt;
use stigmer_api::stamp::StampFn;
use tonic::body::BoxBody;
use tower::{Layer, Service};
use tracing::trace;

/// Rewrite a single gRPC length-prefixed frame, stamping the message.
/// Returns `None` (caller passes the original through) for compressed,
/// truncated, or undecodable frames.
fn stamp_frame(stamp: StampFn, frame: &[u8]) -> Option<Vec<u8>> {
    if frame.len() < 5 || frame[0] != 0 {
        return None;
    }
    let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
    if frame.len() < 5_usize.checked_add(len)? {
        return None;
    }
    let message = &frame[5..5 + len];
    let stamped = stamp(message)?;

    let mut out = Vec::with_capacity(5 + stamped.len() + (frame.len() - 5 - len));
    out.push(0);
    out.extend_from_slice(&u32::try_from(stamped.len()).ok()?.to_be_bytes());
    out.extend_from_slice(&stamped);
    out.extend_from_slice(&frame[5 + len..]);
    Some(out)
}

/// Body replaying a buffered data frame plus preserved trailers, or an
/// error captured while buffering.
enum Replay {
    Frames(VecDeque<Frame<Bytes>>),
    Error(Option<tonic::Status>),
}

struct ReplayBody {
    state: Replay,
}

impl ReplayBody {
    fn frames(data: Bytes, trailers: Option<http::HeaderMap>) -> Self {
        let mut frames = VecDeque::with_capacity(2);
        if !data.is_empty() {
            frames.push_back(Frame::data(data));
        }
        if let Some(trailers) = trailers {
            frames.push_back(Frame::trailers(trailers));
        }
        Self {
            state: Replay::Frames(frames),
        }
    }

    fn error(status: tonic::Status) -> Self {
        Self {
            state: Replay::Error(Some(status)),
        }
    }
}

impl http_body::Body for ReplayBody {
    type Data = Bytes;
    type Error = tonic::Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, tonic::Status>>> {
        let this = self.get_mut();
        match &mut this.state {
            Replay::Frames(frames) => Poll::Ready(frames.pop_front().map(Ok)),
            Replay::Error(status) => Poll::Ready(status.take().map(Err)),
        }
    }
}

async fn restamp_response(
    response: http::Response<BoxBody>,
    stamp: StampFn,
) -> http::Response<BoxBody> {
    let (parts, body) = response.into_parts();
    let collected = match body.collect().await {
        Ok(collected) => collected,
        Err(status) => {
            return http::Response::from_parts(
                parts,
                BoxBody::new(ReplayBody::error(status)),
            );
        }
    };
    let trailers = collected.trailers().cloned();
    let data = collected.to_bytes();

    let stamped = stamp_frame(stamp, &data)
        .map_or_else(|| data.clone(), Bytes::from);
    if stamped.len() != data.len() {
        trace!(before = data.len(), after = stamped.len(), "response restamped");
    }

    http::Response::from_parts(parts, BoxBody::new(ReplayBody::frames(stamped, trailers)))
}

/// Tower layer installing the kind stamper around the server's routes.
#[derive(Clone)]
pub struct KindStampLayer {
    table: Arc<HashMap<String, StampFn>>,
}

impl KindStampLayer {
    /// Build the layer; the table is computed once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(stigmer_api::stamp::stamp_table()),
        }
    }
}

impl Default for KindStampLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for KindStampLayer {
    type Service = KindStampService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        KindStampService {
            inner,
            table: Arc::clone(&self.table),
        }
    }
}

/// The per-connection stamping service.
#[derive(Clone)]
pub struct KindStampService<S> {
    inner: S,
    table: Arc<HashMap<String, StampFn>>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for KindStampService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        let stamp = self.table.get(request.uri().path()).copied();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(request).await?;
            match stamp {
                // Paths outside the table stream through unbuffered.
                None => Ok(response),
                Some(stamp) => Ok(restamp_response(response, stamp).await),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use stigmer_api::v1::{Agent, ApiResourceKind, ApiResourceMetadata};

    fn frame_of(message: &impl Message) -> Vec<u8> {
        let encoded = message.encode_to_vec();
        let mut frame = Vec::with_capacity(5 + encoded.len());
        frame.push(0);
        frame.extend_from_slice(&u32::try_from(encoded.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(&encoded);
        frame
    }

    fn agent_stamp() -> StampFn {
        stigmer_api::stamp::stamp_table()["/stigmer.v1.AgentCommandController/Create"]
    }

    #[test]
    fn stamps_a_unary_frame() {
        let agent = Agent {
            metadata: Some(ApiResourceMetadata {
                id: "agt-1".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let stamped = stamp_frame(agent_stamp(), &frame_of(&agent)).unwrap();

        assert_eq!(stamped[0], 0);
        let len = u32::from_be_bytes([stamped[1], stamped[2], stamped[3], stamped[4]]) as usize;
        assert_eq!(stamped.len(), 5 + len);

        let decoded = Agent::decode(&stamped[5..]).unwrap();
        let meta = decoded.metadata.unwrap();
        assert_eq!(meta.api_version, stigmer_api::API_VERSION);
        assert_eq!(meta.kind(), ApiResourceKind::Agent);
        assert_eq!(meta.id, "agt-1");
    }

    #[test]
    fn compressed_frames_pass_through() {
        let mut frame = frame_of(&Agent::default());
        frame[0] = 1;
        assert!(stamp_frame(agent_stamp(), &frame).is_none());
    }

    #[test]
    fn truncated_frames_pass_through() {
        assert!(stamp_frame(agent_stamp(), &[0, 0, 0]).is_none());
        // Declared length longer than the buffer.
        assert!(stamp_frame(agent_stamp(), &[0, 0, 0, 0, 9, 1, 2]).is_none());
    }
}
