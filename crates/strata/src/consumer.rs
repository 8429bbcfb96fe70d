//! Incremental consumer
//!
//! Drives the read loop over a streaming response body: frames are decoded by
//! the chunk buffer, prose is pushed to a display sink as it arrives, stage
//! progress is re-estimated on every delta, and the trailing block is
//! extracted once the stream has ended.

use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::{Result, StrataError};
use crate::protocol::{
    ChunkBuffer, Extraction, FenceScanner, FrameMode, ProgressTracker, StageEstimator, WireEvent,
    strip_markup,
};
use crate::task::TaskKind;

/// Receives live updates from a session
pub trait DisplaySink: Send {
    /// Display text changed. Carries the whole live prefix, markup stripped.
    fn live_text(&mut self, text: &str);

    /// Stage moved forward. `index == total` means complete.
    fn stage(&mut self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }
}

/// Caller-held handle that stops a session's read loop
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c).await;
    }
}

/// How a read loop ended without an error
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// The body ended. `complete` is true if the sentinel was seen.
    Completed {
        extraction: Extraction,
        complete: bool,
    },
    /// Stopped through a [`CancelHandle`]; nothing was extracted
    Cancelled,
}

impl ConsumeOutcome {
    pub fn extraction(&self) -> Option<&Extraction> {
        match self {
            ConsumeOutcome::Completed { extraction, .. } => Some(extraction),
            ConsumeOutcome::Cancelled => None,
        }
    }
}

/// Consumer-side state of one streaming exchange
pub struct ClientSession {
    id: Uuid,
    buffer: ChunkBuffer,
    scanner: FenceScanner,
    progress: ProgressTracker,
    last_display: String,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl ClientSession {
    pub fn new(mode: FrameMode, estimator: Arc<dyn StageEstimator>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            buffer: ChunkBuffer::new(mode),
            scanner: FenceScanner::new(),
            progress: ProgressTracker::new(estimator),
            last_display: String::new(),
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Session with the stages of the given task and frame mode from config
    pub fn from_config(config: &StreamConfig, kind: TaskKind) -> Self {
        Self::new(
            FrameMode::from_strict(config.strict_frames),
            Arc::new(kind.stages(config.chars_per_stage)),
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Last text handed to the sink
    pub fn live_text(&self) -> &str {
        &self.last_display
    }

    /// All content received, markup intact
    pub fn accumulated_text(&self) -> &str {
        self.scanner.text()
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Start a new session: clears all state and detaches old cancel handles
    pub fn reset(&mut self) {
        let (cancel_tx, _) = watch::channel(false);
        self.id = Uuid::new_v4();
        self.buffer.reset();
        self.scanner = FenceScanner::new();
        self.progress.reset();
        self.last_display.clear();
        self.cancel_tx = Arc::new(cancel_tx);
        debug!(session = %self.id, "Session reset");
    }

    /// Drive the read loop until the sentinel, an error frame, the end of the
    /// body, or cancellation.
    ///
    /// Only one read is outstanding at a time. Once cancelled, the body is
    /// dropped and the sink is not called again.
    pub async fn consume<S, B, E, K>(&mut self, body: S, sink: &mut K) -> Result<ConsumeOutcome>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        K: DisplaySink + ?Sized,
    {
        let cancel = self.cancel_handle();
        let mut body = std::pin::pin!(body);
        debug!(session = %self.id, "Read loop started");

        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled());
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled()),
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!(session = %self.id, error = %e, "Response body failed");
                    return Err(StrataError::Transport(e.to_string()));
                }
                None => break,
            };

            for decoded in self.buffer.feed(chunk.as_ref()) {
                if cancel.is_cancelled() {
                    return Ok(self.cancelled());
                }
                if self.apply(decoded?, sink)? {
                    return Ok(self.completed(true));
                }
            }
        }

        for decoded in self.buffer.finish() {
            if self.apply(decoded?, sink)? {
                return Ok(self.completed(true));
            }
        }

        warn!(session = %self.id, "Stream ended without [DONE]");
        Ok(self.completed(false))
    }

    /// Returns true when the event ends the stream normally
    fn apply<K: DisplaySink + ?Sized>(&mut self, event: WireEvent, sink: &mut K) -> Result<bool> {
        match event {
            WireEvent::ContentDelta(delta) => {
                self.scanner.push(&delta);
                let display = strip_markup(self.scanner.live_prose());
                if display != self.last_display {
                    sink.live_text(&display);
                    self.last_display = display;
                }
                if let Some(stage) = self.progress.update(self.last_display.chars().count()) {
                    sink.stage(stage, self.progress.total(), &self.progress.label());
                }
                Ok(false)
            }
            WireEvent::Done => {
                self.progress.complete();
                let total = self.progress.total();
                sink.stage(total, total, &self.progress.label());
                Ok(true)
            }
            WireEvent::Error(message) => {
                warn!(session = %self.id, "Producer reported error: {}", message);
                Err(StrataError::Stream(message))
            }
        }
    }

    fn completed(&self, complete: bool) -> ConsumeOutcome {
        let extraction = self.scanner.extract();
        info!(
            session = %self.id,
            complete,
            chars = self.scanner.text().len(),
            block_found = extraction.result.is_ok(),
            "Stream finished"
        );
        ConsumeOutcome::Completed {
            extraction,
            complete,
        }
    }

    fn cancelled(&self) -> ConsumeOutcome {
        info!(session = %self.id, "Session cancelled");
        ConsumeOutcome::Cancelled
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("progress", &self.progress)
            .field("chars", &self.scanner.text().len())
            .finish()
    }
}
