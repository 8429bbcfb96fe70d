use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};

/// Main configuration structure for Strata
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Inference backend configuration
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Stream protocol configuration
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    /// Parse a config file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load the explicit config file if given, otherwise the first default
    /// location that exists, otherwise built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in default_config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
        dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:5000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

/// Remote inference API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound for non-streaming calls in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds, applied to streaming calls as well
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Sampling temperature for tender analysis
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,
    /// Sampling temperature for the non-streaming JSON-mode analysis
    #[serde(default = "default_json_analysis_temperature")]
    pub json_analysis_temperature: f32,
    /// Sampling temperature for drafting and rewriting
    #[serde(default = "default_draft_temperature")]
    pub draft_temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            analysis_temperature: default_analysis_temperature(),
            json_analysis_temperature: default_json_analysis_temperature(),
            draft_temperature: default_draft_temperature(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

fn default_model() -> String {
    "mistral-large-2512".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_analysis_temperature() -> f32 {
    0.2
}

fn default_json_analysis_temperature() -> f32 {
    0.1
}

fn default_draft_temperature() -> f32 {
    0.7
}

/// Wire protocol and progress estimation settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Treat a frame with a malformed JSON payload as fatal instead of skipping it
    #[serde(default)]
    pub strict_frames: bool,
    /// Characters of live prose per progress stage
    #[serde(default = "default_chars_per_stage")]
    pub chars_per_stage: usize,
    /// Frames buffered between the upstream relay and the response body
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            strict_frames: false,
            chars_per_stage: default_chars_per_stage(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_chars_per_stage() -> usize {
    400
}

fn default_channel_capacity() -> usize {
    32
}
