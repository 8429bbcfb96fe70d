//! Streaming structured-extraction protocol
//!
//! This module provides the pieces shared by producer and consumer:
//! - Frame encoding/decoding for the `data: ...` wire format
//! - Chunk buffering that is independent of read boundaries
//! - Fence scanning and terminal extraction of the trailing JSON block
//! - Stage estimation from the length of the live prose

pub mod buffer;
pub mod fence;
pub mod frame;
pub mod lines;
pub mod progress;

pub use buffer::{ChunkBuffer, Decoding};
pub use fence::{
    Extraction, ExtractionFailure, ExtractionResult, FenceScanner, FenceState, extract,
    strip_markup,
};
pub use frame::{DONE_SENTINEL, Decoded, FrameError, FrameMode, WireEvent};
pub use lines::LineSplitter;
pub use progress::{BandedStages, FnStages, ProgressTracker, StageEstimator};
