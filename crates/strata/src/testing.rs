//! Test utilities for strata - scripted backends and wire helpers
//!
//! This module provides utilities for exercising the protocol without a
//! network:
//! - A scripted inference backend with observable upstream lifetime
//! - A recording display sink
//! - Helpers that build wire bodies split at arbitrary boundaries

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{ChatRequest, DeltaStream, InferenceBackend};
use crate::consumer::DisplaySink;
use crate::error::{Result, StrataError};
use crate::protocol::WireEvent;

/// What the scripted upstream does once opened
#[derive(Debug, Clone)]
pub enum Script {
    /// Yield every delta, then end normally
    Deltas(Vec<String>),
    /// Fail before any output with the given upstream status
    FailOnOpen(u16),
    /// Yield the deltas, then fail with a transport error
    FailAfter(Vec<String>),
    /// Yield the deltas, then never yield again
    HoldOpen(Vec<String>),
}

/// Inference backend that replays a fixed script.
///
/// Records every request and whether the last opened stream was dropped.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Script,
    completion: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
    opened: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            completion: None,
            requests: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Script::Deltas(deltas.into_iter().map(Into::into).collect()))
    }

    /// Text returned by [`InferenceBackend::complete`]
    pub fn with_completion(mut self, text: impl Into<String>) -> Self {
        self.completion = Some(text.into());
        self
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of streams opened successfully
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// True once the most recently opened upstream stream has been dropped
    pub fn upstream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    fn record(&self, request: ChatRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }
}

/// Sets a flag when dropped together with the stream that owns it
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn ok_deltas(deltas: Vec<String>) -> impl Stream<Item = Result<String>> + Send + 'static {
    stream::iter(deltas.into_iter().map(Ok))
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream> {
        self.record(request);

        let deltas: DeltaStream = match &self.script {
            Script::FailOnOpen(status) => {
                return Err(StrataError::Upstream {
                    status: *status,
                    body: "scripted failure".to_string(),
                });
            }
            Script::Deltas(deltas) => ok_deltas(deltas.clone()).boxed(),
            Script::FailAfter(deltas) => ok_deltas(deltas.clone())
                .chain(stream::once(async {
                    Err(StrataError::Transport("connection reset".to_string()))
                }))
                .boxed(),
            Script::HoldOpen(deltas) => ok_deltas(deltas.clone()).chain(stream::pending()).boxed(),
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.dropped.store(false, Ordering::SeqCst);
        let guard = DropFlag(Arc::clone(&self.dropped));
        Ok(deltas
            .map(move |item| {
                let _alive = &guard;
                item
            })
            .boxed())
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.record(request);
        self.completion
            .clone()
            .ok_or_else(|| StrataError::Inference("no completion scripted".to_string()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Debug, Default)]
struct Recorded {
    live: Vec<String>,
    stages: Vec<(usize, usize)>,
}

/// Display sink that records every callback. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live text updates in the order they were delivered
    pub fn live_updates(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|r| r.live.clone())
            .unwrap_or_default()
    }

    /// `(index, total)` pairs in the order they were delivered
    pub fn stages(&self) -> Vec<(usize, usize)> {
        self.inner
            .lock()
            .map(|r| r.stages.clone())
            .unwrap_or_default()
    }

    pub fn callback_count(&self) -> usize {
        self.inner
            .lock()
            .map(|r| r.live.len() + r.stages.len())
            .unwrap_or_default()
    }
}

impl DisplaySink for RecordingSink {
    fn live_text(&mut self, text: &str) {
        if let Ok(mut r) = self.inner.lock() {
            r.live.push(text.to_string());
        }
    }

    fn stage(&mut self, index: usize, total: usize, _label: &str) {
        if let Ok(mut r) = self.inner.lock() {
            r.stages.push((index, total));
        }
    }
}

/// Concatenate encoded frames
pub fn encode_all(events: &[WireEvent]) -> String {
    events.iter().map(WireEvent::encode).collect()
}

/// Frames for the given deltas followed by the sentinel
pub fn wire_text<S: AsRef<str>>(deltas: &[S]) -> String {
    let mut events: Vec<WireEvent> = deltas
        .iter()
        .map(|d| WireEvent::ContentDelta(d.as_ref().to_string()))
        .collect();
    events.push(WireEvent::Done);
    encode_all(&events)
}

/// Split raw bytes into chunks of at most `size` bytes, ignoring character
/// boundaries
pub fn chunked(
    raw: &[u8],
    size: usize,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    let chunks: Vec<_> = raw
        .chunks(size.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks)
}

/// Split raw bytes at the given offsets
pub fn split_at(
    raw: &[u8],
    offsets: &[usize],
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        let end = offset.clamp(start, raw.len());
        chunks.push(Ok(Bytes::copy_from_slice(&raw[start..end])));
        start = end;
    }
    chunks.push(Ok(Bytes::copy_from_slice(&raw[start..])));
    stream::iter(chunks)
}
