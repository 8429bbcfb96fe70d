//! Mistral backend over the OpenAI-compatible chat completions API
//!
//! Works with any endpoint that speaks the same wire format. The API key is
//! read from the environment variable named in the config.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{ChatMessage, ChatRequest, DeltaStream, InferenceBackend};
use crate::config::InferenceConfig;
use crate::error::{Result, StrataError};
use crate::protocol::{DONE_SENTINEL, LineSplitter};

/// Remote inference via HTTP
#[derive(Debug)]
pub struct MistralBackend {
    /// Client for non-streaming calls, bounded by the request timeout
    client: Client,
    /// Client for streaming calls, bounded by the connect timeout only
    streaming_client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl MistralBackend {
    /// Create a backend, reading the API key from `config.api_key_env`.
    ///
    /// A missing key is not an error here; calls fail until it is set.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "API key env var '{}' not set, inference calls will fail",
                config.api_key_env
            );
        }
        Self::with_api_key(config, api_key)
    }

    /// Create a backend with an explicit key
    pub fn with_api_key(config: &InferenceConfig, api_key: Option<String>) -> Result<Self> {
        let base = config.api_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/chat/completions"))
            .map_err(|e| StrataError::Config(format!("Invalid api_url '{}': {e}", config.api_url)))?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StrataError::Config(e.to_string()))?;
        let streaming_client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StrataError::Config(e.to_string()))?;

        info!(
            "MistralBackend initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            streaming_client,
            endpoint,
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            StrataError::Config(format!("API key env var '{}' not set", self.api_key_env))
        })
    }

    async fn send(
        &self,
        client: &Client,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let api_key = self.api_key()?;
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!("Calling inference API at: {} (stream={})", self.endpoint, stream);

        let response = client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StrataError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl InferenceBackend for MistralBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream> {
        let response = self.send(&self.streaming_client, &request, true).await?;
        Ok(upstream_deltas(response.bytes_stream().boxed()))
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let response = self.send(&self.client, &request, false).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| StrataError::Serialization(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StrataError::Inference("Empty response".to_string()))
    }

    fn name(&self) -> &'static str {
        "mistral"
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StrataError {
    if e.is_timeout() {
        StrataError::Transport(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        StrataError::Transport(format!("Failed to connect to upstream: {e}"))
    } else {
        StrataError::Transport(format!("Request failed: {e}"))
    }
}

/// One parsed line of the upstream SSE body
#[derive(Debug, PartialEq)]
enum UpstreamLine {
    Delta(String),
    Done,
    Error(String),
    Skip,
}

fn parse_upstream_line(line: &str) -> UpstreamLine {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return UpstreamLine::Skip;
    };
    let data = data.trim();

    if data == DONE_SENTINEL {
        return UpstreamLine::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Skipping unparseable upstream line");
            return UpstreamLine::Skip;
        }
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return UpstreamLine::Error(message);
    }

    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .map(|s| UpstreamLine::Delta(s.to_string()))
        .unwrap_or(UpstreamLine::Skip)
}

struct UpstreamDeltas {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    lines: LineSplitter,
    ready: VecDeque<Result<String>>,
    finished: bool,
}

impl UpstreamDeltas {
    fn absorb(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.finished {
                break;
            }
            match parse_upstream_line(&line) {
                UpstreamLine::Delta(text) => {
                    if !text.is_empty() {
                        self.ready.push_back(Ok(text));
                    }
                }
                UpstreamLine::Done => self.finished = true,
                UpstreamLine::Error(message) => {
                    self.ready.push_back(Err(StrataError::Inference(message)));
                    self.finished = true;
                }
                UpstreamLine::Skip => {}
            }
        }
    }
}

/// Turn the raw upstream body into a stream of content deltas
fn upstream_deltas(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> DeltaStream {
    let state = UpstreamDeltas {
        bytes,
        lines: LineSplitter::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.lines.push_bytes(&chunk);
                    state.absorb(lines);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(map_reqwest_error(e)), state));
                }
                None => {
                    let tail = state.lines.finish();
                    state.absorb(tail.into_iter().collect());
                    if !state.finished {
                        debug!("Upstream closed without a [DONE] marker");
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String) -> InferenceConfig {
        InferenceConfig {
            api_url,
            model: "mistral-large-2512".to_string(),
            ..InferenceConfig::default()
        }
    }

    fn backend(server: &MockServer) -> MistralBackend {
        MistralBackend::with_api_key(
            &create_test_config(server.uri()),
            Some("test-key".to_string()),
        )
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            temperature: 0.2,
            json_mode: false,
        }
    }

    fn upstream_sse(deltas: &[&str], done: bool) -> String {
        let mut body = String::new();
        body.push_str("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        for delta in deltas {
            let chunk = serde_json::json!({"choices": [{"delta": {"content": delta}}]});
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        if done {
            body.push_str("data: [DONE]\n\n");
        }
        body
    }

    async fn collect(stream: DeltaStream) -> Vec<std::result::Result<String, String>> {
        stream
            .map(|item| item.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[test]
    fn test_parse_upstream_line() {
        assert_eq!(
            parse_upstream_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            UpstreamLine::Delta("Hi".to_string())
        );
        assert_eq!(parse_upstream_line("data: [DONE]"), UpstreamLine::Done);
        assert_eq!(
            parse_upstream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            UpstreamLine::Skip
        );
        assert_eq!(parse_upstream_line(": ping"), UpstreamLine::Skip);
        assert_eq!(parse_upstream_line("data: {broken"), UpstreamLine::Skip);
        assert_eq!(
            parse_upstream_line(r#"data: {"error":{"message":"overloaded"}}"#),
            UpstreamLine::Error("overloaded".to_string())
        );
    }

    #[test]
    fn test_invalid_api_url_is_config_error() {
        let result = MistralBackend::with_api_key(
            &create_test_config("not a url".to_string()),
            Some("k".to_string()),
        );
        assert!(matches!(result, Err(StrataError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_call() {
        let server = MockServer::start().await;
        let backend = MistralBackend::with_api_key(&create_test_config(server.uri()), None).unwrap();

        let err = backend.stream_chat(request()).await.err().unwrap();
        assert!(matches!(err, StrataError::Config(_)));
        assert!(err.to_string().contains("MISTRAL_API_KEY"));
    }

    #[tokio::test]
    async fn test_stream_chat_yields_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral-large-2512",
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(upstream_sse(&["Hello ", "", "wörld"], true), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let stream = backend(&server).stream_chat(request()).await.unwrap();
        let items = collect(stream).await;
        assert_eq!(items, vec![Ok("Hello ".to_string()), Ok("wörld".to_string())]);
    }

    #[tokio::test]
    async fn test_stream_without_done_ends_normally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(upstream_sse(&["only"], false), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let stream = backend(&server).stream_chat(request()).await.unwrap();
        assert_eq!(collect(stream).await, vec![Ok("only".to_string())]);
    }

    #[tokio::test]
    async fn test_stream_error_event_ends_with_err() {
        let server = MockServer::start().await;
        let mut body = upstream_sse(&["partial"], false);
        body.push_str("data: {\"error\":{\"message\":\"capacity exceeded\"}}\n\n");
        body.push_str("data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n");

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = backend(&server).stream_chat(request()).await.unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("partial".to_string()));
        assert!(items[1].as_ref().unwrap_err().contains("capacity exceeded"));
    }

    #[tokio::test]
    async fn test_upstream_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = backend(&server).stream_chat(request()).await.err().unwrap();
        match err {
            StrataError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_complete_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "stream": false,
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"ok\":true}"}}]
            })))
            .mount(&server)
            .await;

        let mut req = request();
        req.json_mode = true;
        let content = backend(&server).complete(req).await.unwrap();
        assert_eq!(content, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, StrataError::Inference(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let config = create_test_config("http://127.0.0.1:9".to_string());
        let backend = MistralBackend::with_api_key(&config, Some("k".to_string())).unwrap();

        let err = backend.stream_chat(request()).await.err().unwrap();
        assert!(matches!(err, StrataError::Transport(_)));
    }
}
