//! End-to-end scenarios for one streaming exchange
//!
//! Each test drives a consumer session over a wire body, either built by hand
//! or produced by the stream producer over a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use strata::StrataError;
use strata::config::InferenceConfig;
use strata::consumer::{ClientSession, ConsumeOutcome};
use strata::producer::StreamProducer;
use strata::protocol::{BandedStages, ExtractionFailure, FrameMode};
use strata::task::StreamTask;
use strata::testing::{RecordingSink, Script, ScriptedBackend, chunked, wire_text};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

fn session() -> ClientSession {
    ClientSession::new(FrameMode::Lenient, Arc::new(BandedStages::default()))
}

fn analysis_task() -> StreamTask {
    StreamTask::TenderAnalysis {
        text: "Supply of road salt, lot 2".to_string(),
    }
}

async fn produce(script: Script) -> (axum::response::Response, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(script));
    let producer = StreamProducer::new(backend.clone(), 8);
    let task = analysis_task();
    let response = producer
        .open(task.kind(), task.streaming_request(&InferenceConfig::default()))
        .await;
    (response, backend)
}

async fn wait_for_updates(sink: &RecordingSink, count: usize) {
    for _ in 0..200 {
        if sink.live_updates().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sink never received {count} updates");
}

// =============================================================================
// Completed Stream Scenarios
// =============================================================================

mod completed_tests {
    use super::*;

    #[tokio::test]
    async fn test_prose_only_stream() {
        let raw = wire_text(&["Hello ", "world"]);
        let mut sink = RecordingSink::new();

        let outcome = session()
            .consume(chunked(raw.as_bytes(), 4), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.live_updates(), vec!["Hello ", "Hello world"]);
        let ConsumeOutcome::Completed {
            extraction,
            complete,
        } = outcome
        else {
            panic!("stream was cancelled");
        };
        assert!(complete);
        assert_eq!(extraction.prose, "Hello world");
        assert_eq!(extraction.result, Err(ExtractionFailure::NoBlockFound));
    }

    #[tokio::test]
    async fn test_prose_then_block() {
        let raw = wire_text(&["Hello ", "world\n", "```json\n", "{\"a\":1}\n", "```\n"]);
        let mut sink = RecordingSink::new();

        let outcome = session()
            .consume(chunked(raw.as_bytes(), 9), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.live_updates(), vec!["Hello ", "Hello world\n"]);
        let extraction = outcome.extraction().unwrap();
        assert_eq!(extraction.prose, "Hello world\n");
        assert_eq!(extraction.result, Ok(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_invalid_block_keeps_prose() {
        let raw = wire_text(&["Findings follow.\n", "```json\n{\"a\":}\n```"]);
        let mut sink = RecordingSink::new();
        let mut session = session();

        let outcome = session
            .consume(chunked(raw.as_bytes(), 16), &mut sink)
            .await
            .unwrap();

        let extraction = outcome.extraction().unwrap();
        assert!(matches!(
            extraction.result,
            Err(ExtractionFailure::InvalidJson(_))
        ));
        assert_eq!(extraction.prose, "Findings follow.\n");
        assert_eq!(session.live_text(), "Findings follow.\n");
    }

    #[tokio::test]
    async fn test_producer_output_round_trips_through_consumer() {
        let (response, backend) = produce(Script::Deltas(vec![
            "# Overview\n".to_string(),
            "Bid is **feasible**.\n```js".to_string(),
            "on\n{\"score\": 80}\n```".to_string(),
        ]))
        .await;
        assert_eq!(response.status(), 200);

        let mut sink = RecordingSink::new();
        let outcome = session()
            .consume(response.into_body().into_data_stream(), &mut sink)
            .await
            .unwrap();

        assert!(matches!(outcome, ConsumeOutcome::Completed { complete: true, .. }));
        assert_eq!(outcome.extraction().unwrap().result, Ok(json!({"score": 80})));
        assert_eq!(
            sink.live_updates().last().map(String::as_str),
            Some("Overview\nBid is feasible.\n")
        );
        assert_eq!(backend.opened(), 1);
    }

    #[tokio::test]
    async fn test_missing_sentinel_is_incomplete() {
        let raw = "data: {\"content\":\"cut short\"}\n\n";
        let outcome = session()
            .consume(chunked(raw.as_bytes(), 64), &mut RecordingSink::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ConsumeOutcome::Completed {
                complete: false,
                ..
            }
        ));
    }
}

// =============================================================================
// Failure Scenarios
// =============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_upstream_fails_on_open() {
        let (response, backend) = produce(Script::FailOnOpen(502)).await;
        assert_eq!(response.status(), 500);
        assert_eq!(backend.opened(), 0);

        let mut sink = RecordingSink::new();
        let err = session()
            .consume(response.into_body().into_data_stream(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StrataError::Stream(ref m) if m == "Model service returned 502"));
        assert!(sink.live_updates().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_fails_mid_stream() {
        let (response, _backend) = produce(Script::FailAfter(vec!["Partial ".to_string()])).await;
        assert_eq!(response.status(), 200);

        let mut sink = RecordingSink::new();
        let mut session = session();
        let err = session
            .consume(response.into_body().into_data_stream(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StrataError::Stream(_)));
        assert_eq!(sink.live_updates(), vec!["Partial "]);
        assert_eq!(session.accumulated_text(), "Partial ");
    }
}

// =============================================================================
// Cancellation Scenarios
// =============================================================================

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_after_two_deltas() {
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
        let mut session = session();
        let cancel = session.cancel_handle();
        let sink = RecordingSink::new();
        let mut task_sink = sink.clone();

        let reader = tokio::spawn(async move {
            session
                .consume(ReceiverStream::new(rx), &mut task_sink)
                .await
        });

        for delta in ["first ", "second "] {
            let frame = wire_frame(delta);
            tx.send(Ok(frame)).await.unwrap();
        }
        wait_for_updates(&sink, 2).await;
        let seen = sink.callback_count();

        cancel.cancel();
        let outcome = reader.await.unwrap().unwrap();
        assert_eq!(outcome, ConsumeOutcome::Cancelled);
        assert!(outcome.extraction().is_none());

        // The body was dropped with the read loop
        assert!(tx.is_closed());
        let _ = tx.send(Ok(wire_frame("third"))).await;
        assert_eq!(sink.callback_count(), seen);
    }

    #[tokio::test]
    async fn test_reset_detaches_old_handle() {
        let mut session = session();
        let old = session.cancel_handle();
        let first_id = session.id();

        session.reset();
        old.cancel();

        assert_ne!(session.id(), first_id);
        assert!(!session.cancel_handle().is_cancelled());

        let raw = wire_text(&["fresh"]);
        let outcome = session
            .consume(chunked(raw.as_bytes(), 3), &mut RecordingSink::new())
            .await
            .unwrap();
        assert_eq!(outcome.extraction().unwrap().prose, "fresh");
    }

    fn wire_frame(delta: &str) -> Bytes {
        Bytes::from(strata::protocol::WireEvent::ContentDelta(delta.to_string()).encode())
    }
}
