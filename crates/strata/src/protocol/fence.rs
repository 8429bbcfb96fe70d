//! Fence scanning and terminal extraction
//!
//! Model output is free prose followed by a fenced JSON block:
//!
//! ````text
//! ...prose...
//! ```json
//! { "a": 1 }
//! ```
//! ````
//!
//! [`FenceScanner`] tracks where the block starts while deltas arrive so the
//! consumer can show prose only. [`extract`] parses the block once the stream
//! has ended. Only a trailing block counts: prose after a closed block turns
//! the block back into prose.

use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";
const LANGUAGE_TAG: &str = "json";

/// Position of the scanner relative to the fenced block.
///
/// Offsets are byte positions into the accumulated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceState {
    #[default]
    ScanningProse,
    /// The opener line was completed; no block lines yet
    FenceOpenSeen { opener: usize, body_start: usize },
    CollectingBlock { opener: usize, body_start: usize },
    FenceCloseSeen {
        opener: usize,
        body_start: usize,
        body_end: usize,
    },
}

impl FenceState {
    fn opener(&self) -> Option<usize> {
        match *self {
            FenceState::ScanningProse => None,
            FenceState::FenceOpenSeen { opener, .. }
            | FenceState::CollectingBlock { opener, .. }
            | FenceState::FenceCloseSeen { opener, .. } => Some(opener),
        }
    }
}

/// Extraction failure kinds. Both are non-fatal for the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("no fenced block found")]
    NoBlockFound,
    #[error("invalid JSON in fenced block: {0}")]
    InvalidJson(String),
}

pub type ExtractionResult = Result<Value, ExtractionFailure>;

/// Terminal outcome of a session's text
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Text before the block, markup intact
    pub prose: String,
    pub result: ExtractionResult,
}

/// Incremental fence tracker over the accumulated text
#[derive(Debug, Clone, Default)]
pub struct FenceScanner {
    text: String,
    /// Start of the line not yet terminated by `\n`
    line_start: usize,
    state: FenceState,
}

impl FenceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a content delta and advance over any lines it completes
    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
        while let Some(rel) = self.text[self.line_start..].find('\n') {
            let end = self.line_start + rel;
            self.state = step(
                self.state,
                &self.text[self.line_start..end],
                self.line_start,
                end,
            );
            self.line_start = end + 1;
        }
    }

    /// Everything received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// State over complete lines only
    pub fn state(&self) -> FenceState {
        self.state
    }

    /// State including the unterminated last line, as if the text ended here
    pub fn settled_state(&self) -> FenceState {
        if self.line_start >= self.text.len() {
            return self.state;
        }
        step(
            self.state,
            &self.text[self.line_start..],
            self.line_start,
            self.text.len(),
        )
    }

    /// Prose safe to show right now.
    ///
    /// A partial last line is cut before anything that might become a fence
    /// marker once more text arrives.
    pub fn live_prose(&self) -> &str {
        let state = match self.state {
            FenceState::FenceCloseSeen { .. } if self.partial_reopens_prose() => {
                FenceState::ScanningProse
            }
            state => state,
        };
        if let Some(opener) = state.opener() {
            return &self.text[..opener];
        }

        let partial = &self.text[self.line_start..];
        let keep = match partial.find(FENCE) {
            Some(idx) => idx,
            None => partial.trim_end_matches('`').len(),
        };
        &self.text[..self.line_start + keep]
    }

    /// A partial line after a closed block that is already prose and cannot
    /// become an opener
    fn partial_reopens_prose(&self) -> bool {
        let partial = &self.text[self.line_start..];
        !partial.trim().is_empty() && !partial.contains('`')
    }

    /// Run terminal extraction over the text received so far
    pub fn extract(&self) -> Extraction {
        let state = self.settled_state();
        let len = self.text.len();

        let (prose_end, body) = match state {
            FenceState::ScanningProse => {
                return Extraction {
                    prose: self.text.clone(),
                    result: Err(ExtractionFailure::NoBlockFound),
                };
            }
            FenceState::FenceOpenSeen { opener, body_start }
            | FenceState::CollectingBlock { opener, body_start } => {
                // Unclosed at end of stream: the remainder is the block
                (opener, &self.text[body_start.min(len)..])
            }
            FenceState::FenceCloseSeen {
                opener,
                body_start,
                body_end,
            } => (opener, &self.text[body_start.min(body_end)..body_end]),
        };

        let result = serde_json::from_str::<Value>(body.trim())
            .map_err(|e| ExtractionFailure::InvalidJson(e.to_string()));

        Extraction {
            prose: self.text[..prose_end].to_string(),
            result,
        }
    }
}

/// Extract the trailing fenced block from a complete text. Pure.
pub fn extract(full_text: &str) -> Extraction {
    let mut scanner = FenceScanner::new();
    scanner.push(full_text);
    scanner.extract()
}

fn step(state: FenceState, line: &str, start: usize, end: usize) -> FenceState {
    match state {
        FenceState::ScanningProse => match opener_at(line) {
            Some(idx) => FenceState::FenceOpenSeen {
                opener: start + idx,
                body_start: end + 1,
            },
            None => state,
        },
        // Prose after a closed block means the block is no longer trailing
        FenceState::FenceCloseSeen { .. } => match opener_at(line) {
            Some(idx) => FenceState::FenceOpenSeen {
                opener: start + idx,
                body_start: end + 1,
            },
            None if line.trim().is_empty() => state,
            None => FenceState::ScanningProse,
        },
        FenceState::FenceOpenSeen { opener, body_start }
        | FenceState::CollectingBlock { opener, body_start } => match closer_at(line) {
            Some(idx) => FenceState::FenceCloseSeen {
                opener,
                body_start,
                body_end: start + idx,
            },
            None => FenceState::CollectingBlock { opener, body_start },
        },
    }
}

/// Offset of the marker in a line that ends with "```json"
fn opener_at(line: &str) -> Option<usize> {
    let idx = line.rfind(FENCE)?;
    let tag = line[idx + FENCE.len()..].trim();
    tag.eq_ignore_ascii_case(LANGUAGE_TAG).then_some(idx)
}

/// Offset of the marker in a line that ends with "```"
fn closer_at(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    trimmed
        .ends_with(FENCE)
        .then(|| trimmed.len() - FENCE.len())
}

/// Remove display markup: backticks, asterisks, leading heading hashes
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line = match line.strip_prefix('#') {
            Some(rest) => {
                let rest = rest.trim_start_matches('#');
                rest.strip_prefix(' ').unwrap_or(rest)
            }
            None => line,
        };
        out.extend(line.chars().filter(|c| *c != '`' && *c != '*'));
    }
    out
}
