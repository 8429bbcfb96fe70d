//! Inference backend abstraction
//!
//! Defines the InferenceBackend trait over the remote language model so the
//! producer can be driven by the real HTTP API or a scripted stand-in.

pub mod mistral;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::Result;

pub use mistral::MistralBackend;

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of a chat request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A fully prepared request for the model
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the model for a bare JSON object instead of prose
    pub json_mode: bool,
}

/// Text deltas in arrival order. An `Err` item ends the stream.
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// Trait for inference backends (remote API, scripted test double)
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Open a token stream.
    ///
    /// Errors returned here happen before any output exists; errors yielded by
    /// the stream happen mid-output.
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream>;

    /// Run a request to completion and return the full message text
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
