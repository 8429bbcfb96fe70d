//! Strata - streaming tender analysis with structured extraction
//!
//! This crate relays a language model's token stream to clients as
//! Server-Sent Events and provides the client-side machinery that renders the
//! live prose, estimates analysis progress and parses the trailing fenced
//! JSON block once the stream has finished.

pub mod analysis;
pub mod backend;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod prompts;
pub mod protocol;
pub mod server;
pub mod task;
pub mod testing;

pub use error::{Result, StrataError};
