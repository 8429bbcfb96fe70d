//! Error types for Strata

use thiserror::Error;

use crate::protocol::FrameError;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inference backend could not produce a result
    #[error("Inference error: {0}")]
    Inference(String),

    /// A remote HTTP peer answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Network drop, refused connection, timeout or an aborted body
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame-level protocol violation (strict decoding only)
    #[error("Protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// The producer reported a failure through an error frame
    #[error("Stream error: {0}")]
    Stream(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl StrataError {
    /// Short message suitable for an error frame sent to a browser
    pub fn client_message(&self) -> String {
        match self {
            StrataError::Upstream { status, .. } => format!("Model service returned {status}"),
            StrataError::Transport(_) => "Connection to the model service failed".to_string(),
            StrataError::Config(msg) => msg.clone(),
            _ => "Stream failed".to_string(),
        }
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
