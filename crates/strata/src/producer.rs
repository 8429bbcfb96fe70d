//! Stream producer
//!
//! Opens a streaming request against the inference backend and relays every
//! delta to the HTTP response as a wire frame. The relay runs in its own task
//! and stops as soon as the response body is dropped, which also drops the
//! upstream stream.

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::{ChatRequest, DeltaStream, InferenceBackend};
use crate::protocol::WireEvent;
use crate::task::TaskKind;

type FrameSender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Terminal state of a [`StreamSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Done,
    Errored,
    /// The client went away before the upstream finished
    Abandoned,
}

/// One relayed exchange, owned by its relay task
pub struct StreamSession {
    pub id: Uuid,
    pub kind: TaskKind,
    upstream: DeltaStream,
    state: SessionState,
    deltas: usize,
    chars: usize,
    started: Instant,
}

impl StreamSession {
    fn new(id: Uuid, kind: TaskKind, upstream: DeltaStream) -> Self {
        Self {
            id,
            kind,
            upstream,
            state: SessionState::Open,
            deltas: 0,
            chars: 0,
            started: Instant::now(),
        }
    }

    /// Forward upstream deltas until the upstream ends, fails, or the client
    /// disconnects
    async fn relay(mut self, tx: FrameSender) -> SessionState {
        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => {
                    self.finish(SessionState::Abandoned);
                    return self.state;
                }
                next = self.upstream.next() => next,
            };

            match next {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    self.deltas += 1;
                    self.chars += delta.chars().count();
                    let frame = WireEvent::ContentDelta(delta).encode();
                    if tx.send(Ok(Bytes::from(frame))).await.is_err() {
                        self.finish(SessionState::Abandoned);
                        return self.state;
                    }
                }
                Some(Err(e)) => {
                    error!(session = %self.id, task = %self.kind, "Upstream failed mid-stream: {}", e);
                    let frame = WireEvent::Error(e.client_message()).encode();
                    let _ = tx.send(Ok(Bytes::from(frame))).await;
                    self.finish(SessionState::Errored);
                    return self.state;
                }
                None => {
                    let _ = tx.send(Ok(Bytes::from(WireEvent::Done.encode()))).await;
                    self.finish(SessionState::Done);
                    return self.state;
                }
            }
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match state {
            SessionState::Abandoned => info!(
                session = %self.id,
                task = %self.kind,
                deltas = self.deltas,
                chars = self.chars,
                elapsed_ms,
                "Client disconnected, releasing upstream"
            ),
            _ => info!(
                session = %self.id,
                task = %self.kind,
                deltas = self.deltas,
                chars = self.chars,
                elapsed_ms,
                outcome = ?state,
                "Stream closed"
            ),
        }
    }
}

/// Relays backend token streams to HTTP clients
#[derive(Clone)]
pub struct StreamProducer {
    backend: Arc<dyn InferenceBackend>,
    channel_capacity: usize,
}

impl StreamProducer {
    pub fn new(backend: Arc<dyn InferenceBackend>, channel_capacity: usize) -> Self {
        Self {
            backend,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Open the upstream stream and return the SSE response.
    ///
    /// If the backend fails before producing anything the status is 500 and
    /// the body is a single error frame. Later failures keep status 200 and end
    /// the body with an error frame.
    pub async fn open(&self, kind: TaskKind, request: ChatRequest) -> Response {
        let id = Uuid::new_v4();
        info!(session = %id, task = %kind, backend = self.backend.name(), "Opening stream");

        let upstream = match self.backend.stream_chat(request).await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(session = %id, task = %kind, "Failed to open upstream stream: {}", e);
                let frame = WireEvent::Error(e.client_message()).encode();
                return sse_response(StatusCode::INTERNAL_SERVER_ERROR, Body::from(frame));
            }
        };

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let session = StreamSession::new(id, kind, upstream);
        tokio::spawn(async move {
            let state = session.relay(tx).await;
            debug!(session = %id, "Relay task ended in state {:?}", state);
        });

        sse_response(StatusCode::OK, Body::from_stream(ReceiverStream::new(rx)))
    }
}

/// Response with headers for a long-lived, unbuffered event stream
pub fn sse_response(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}
