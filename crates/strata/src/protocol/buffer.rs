//! Consumer-side chunk buffer

use super::frame::{Decoded, FrameError, FrameMode, WireEvent, decode_line};
use super::lines::LineSplitter;

/// One decoded frame, or the reason it could not be decoded
pub type Decoding = Result<WireEvent, FrameError>;

/// Turns arbitrarily split reads into complete wire events.
///
/// Lines are decoded one at a time, so the sequence of results is the same no
/// matter how the input bytes were chunked. The sequence ends at the first
/// terminal event or decode error; nothing after it is decoded.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    lines: LineSplitter,
    mode: FrameMode,
    ended: bool,
}

impl ChunkBuffer {
    pub fn new(mode: FrameMode) -> Self {
        Self {
            lines: LineSplitter::new(),
            mode,
            ended: false,
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Feed one read from the body
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Decoding> {
        if self.ended {
            return Vec::new();
        }
        let lines = self.lines.push_bytes(chunk);
        self.decode_lines(lines)
    }

    pub fn feed_str(&mut self, chunk: &str) -> Vec<Decoding> {
        if self.ended {
            return Vec::new();
        }
        let lines = self.lines.push_str(chunk);
        self.decode_lines(lines)
    }

    /// Decode the unterminated remainder at end of body
    pub fn finish(&mut self) -> Vec<Decoding> {
        if self.ended {
            return Vec::new();
        }
        match self.lines.finish() {
            Some(line) => self.decode_lines(vec![line]),
            None => Vec::new(),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.lines.has_pending()
    }

    /// True once a terminal event or a decode error has been produced
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn reset(&mut self) {
        self.lines.clear();
        self.ended = false;
    }

    fn decode_lines(&mut self, lines: Vec<String>) -> Vec<Decoding> {
        let mut out = Vec::new();
        for line in lines {
            match decode_line(&line, self.mode) {
                Ok(Decoded::Event(event)) => {
                    self.ended = event.is_terminal();
                    out.push(Ok(event));
                }
                Ok(_) => {}
                Err(e) => {
                    self.ended = true;
                    out.push(Err(e));
                }
            }
            if self.ended {
                self.lines.clear();
                break;
            }
        }
        out
    }
}
