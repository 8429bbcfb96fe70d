//! HTTP client for the streaming endpoints
//!
//! Opens a streaming request against a running server and hands the response
//! body to a [`ClientSession`].

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::consumer::{ClientSession, ConsumeOutcome, DisplaySink};
use crate::error::{Result, StrataError};
use crate::task::StreamTask;

/// Raw response body of a streaming endpoint
pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Client for a Strata server
#[derive(Debug, Clone)]
pub struct StrataClient {
    http: Client,
    base_url: Url,
}

impl StrataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StrataError::Config(format!("Invalid server URL '{base_url}': {e}")))?;
        // No overall timeout: streams stay open as long as the model writes
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StrataError::Config(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST the task and return the event stream body.
    ///
    /// An event-stream body is returned whatever the status, so an error frame
    /// sent with a 500 reaches the consumer. Any other body is turned into an
    /// error here.
    pub async fn open_stream(&self, task: &StreamTask) -> Result<ByteStream> {
        let url = self
            .base_url
            .join(task.path())
            .map_err(|e| StrataError::Config(format!("Invalid endpoint URL: {e}")))?;
        tracing::debug!("Opening {} stream at {}", task.kind(), url);

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&task.payload())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    StrataError::Transport(format!("Failed to connect to server: {e}"))
                } else {
                    StrataError::Transport(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if is_event_stream {
            if !status.is_success() {
                tracing::warn!("Server answered {} with an event stream", status);
            }
            return Ok(response.bytes_stream().boxed());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        Err(StrataError::Upstream {
            status: status.as_u16(),
            body: message,
        })
    }

    /// Run one task end to end through the given session.
    ///
    /// Cancelling the session while the request is still being sent also
    /// returns [`ConsumeOutcome::Cancelled`].
    pub async fn run<K>(
        &self,
        task: &StreamTask,
        session: &mut ClientSession,
        sink: &mut K,
    ) -> Result<ConsumeOutcome>
    where
        K: DisplaySink + ?Sized,
    {
        let cancel = session.cancel_handle();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ConsumeOutcome::Cancelled),
            body = self.open_stream(task) => body?,
        };
        session.consume(body, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameMode;
    use crate::testing::{RecordingSink, wire_text};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analysis_task() -> StreamTask {
        StreamTask::TenderAnalysis {
            text: "Tender".to_string(),
        }
    }

    fn session() -> ClientSession {
        ClientSession::new(
            FrameMode::Lenient,
            std::sync::Arc::new(crate::protocol::BandedStages::default()),
        )
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            StrataClient::new("not a url"),
            Err(StrataError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_consumes_stream() {
        let server = MockServer::start().await;
        let body = wire_text(&["Prose\n", "```json\n{\"a\":1}\n```"]);
        Mock::given(method("POST"))
            .and(path("/api/tender/analyze/stream"))
            .and(body_json(json!({"text": "Tender"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = StrataClient::new(&server.uri()).unwrap();
        let mut sink = RecordingSink::new();
        let outcome = client
            .run(&analysis_task(), &mut session(), &mut sink)
            .await
            .unwrap();

        assert_eq!(
            outcome.extraction().unwrap().result,
            Ok(json!({"a": 1}))
        );
        assert_eq!(sink.live_updates(), vec!["Prose\n"]);
    }

    #[tokio::test]
    async fn test_error_frame_with_500_reaches_consumer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/proposal/draft/stream"))
            .respond_with(ResponseTemplate::new(500).set_body_raw(
                "data: {\"error\":\"Stream failed\"}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = StrataClient::new(&server.uri()).unwrap();
        let task = StreamTask::Draft {
            prompt: "p".to_string(),
            context: "c".to_string(),
        };
        let err = client
            .run(&task, &mut session(), &mut RecordingSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Stream(ref m) if m == "Stream failed"));
    }

    #[tokio::test]
    async fn test_json_error_body_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "Tender text is required"})),
            )
            .mount(&server)
            .await;

        let client = StrataClient::new(&server.uri()).unwrap();
        let err = client.open_stream(&analysis_task()).await.err().unwrap();
        match err {
            StrataError::Upstream { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Tender text is required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_open() {
        let server = MockServer::start().await;
        let client = StrataClient::new(&server.uri()).unwrap();
        let mut session = session();
        session.cancel_handle().cancel();

        let mut sink = RecordingSink::new();
        let outcome = client
            .run(&analysis_task(), &mut session, &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome, ConsumeOutcome::Cancelled);
        assert_eq!(sink.callback_count(), 0);
    }
}
