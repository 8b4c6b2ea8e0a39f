//! Task processor tests over the in-memory stream backend

mod common;

use common::{services, task_json, wait_for, MockDetector, MockFeedback, RecordingCallback};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use truegul_core::{CallbackStatus, ErrorCode, InferenceError, WritingKind};
use truegul_worker::mq::{
    Consumer, ConsumerOptions, ConsumerState, MemoryBackend, Message, StreamConsumer,
};
use truegul_worker::TaskProcessor;

const STREAM: &str = "analysis_tasks";
const GROUP: &str = "ml_workers";

struct Harness {
    backend: MemoryBackend,
    processor: TaskProcessor,
    detector: Arc<MockDetector>,
    feedback: Arc<MockFeedback>,
    callback: Arc<RecordingCallback>,
}

impl Harness {
    fn new(detector: MockDetector, feedback: MockFeedback, callback: RecordingCallback) -> Self {
        let backend = MemoryBackend::new();
        let options = ConsumerOptions::new(STREAM, GROUP, "worker_1")
            .with_block_timeout(Duration::from_millis(50))
            .with_error_backoff(Duration::from_millis(10));
        let consumer: Arc<dyn Consumer> = Arc::new(StreamConsumer::new(backend.clone(), options));

        let detector = Arc::new(detector);
        let feedback = Arc::new(feedback);
        let callback = Arc::new(callback);
        let processor = TaskProcessor::new(
            consumer,
            services(detector.clone(), feedback.clone()),
            callback.clone(),
        );

        Self {
            backend,
            processor,
            detector,
            feedback,
            callback,
        }
    }

    fn publish(&self, payload: &str) -> String {
        self.backend.append(
            STREAM,
            HashMap::from([("task".to_string(), payload.to_string())]),
        )
    }

    fn publish_fields(&self, fields: HashMap<String, String>) -> String {
        self.backend.append(STREAM, fields)
    }

    /// Wait until every published entry has been delivered and acknowledged
    async fn drain(&self, expected_callbacks: usize) {
        let callback = self.callback.clone();
        assert!(
            wait_for(Duration::from_secs(5), || callback.sent().len() >= expected_callbacks).await,
            "timed out waiting for {} callbacks",
            expected_callbacks
        );
        let backend = self.backend.clone();
        assert!(wait_for(Duration::from_secs(5), || backend.pending_count(STREAM, GROUP) == 0).await);
    }
}

#[tokio::test]
async fn test_completed_task_sends_result_callback() {
    let harness = Harness::new(
        MockDetector::new(12.5),
        MockFeedback::new("Good clarity."),
        RecordingCallback::new(),
    );
    harness.processor.start().await.unwrap();

    harness.publish(
        r#"{"task_id":"t1","writing_id":"w1","content":"Hello world.","writing_type":"essay","callback_url":"http://x/cb"}"#,
    );
    harness.drain(1).await;

    let sent = harness.callback.sent();
    assert_eq!(sent.len(), 1);
    let (url, payload) = &sent[0];
    assert_eq!(url, "http://x/cb");
    assert_eq!(payload.task_id, "t1");
    assert_eq!(payload.status, CallbackStatus::Completed);

    let body = serde_json::to_value(payload).unwrap();
    assert_eq!(body["version"], "1");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["ai_probability"], 12.5);
    assert_eq!(body["result"]["feedback"], "Good clarity.");
    assert!(body["result"]["latency_ms"].as_u64().is_some());
    assert!(body.get("error").is_none());

    assert_eq!(harness.feedback.calls(), vec![(WritingKind::Essay, 12.5)]);

    harness.processor.shutdown().await;
}

#[tokio::test]
async fn test_model_failure_sends_retryable_error_callback() {
    let harness = Harness::new(
        MockDetector::failing(InferenceError::internal("model not loaded")),
        MockFeedback::new("unused"),
        RecordingCallback::new(),
    );
    harness.processor.start().await.unwrap();

    harness.publish(&task_json("t2", "Some text.", "essay"));
    harness.drain(1).await;

    let (_, payload) = &harness.callback.sent()[0];
    let body = serde_json::to_value(payload).unwrap();
    assert_eq!(
        body,
        json!({
            "version": "1",
            "task_id": "t2",
            "status": "failed",
            "error": {"code": "ML_MODEL_ERROR", "message": "model not loaded", "retryable": true}
        })
    );
    assert!(harness.feedback.calls().is_empty());

    harness.processor.shutdown().await;
}

#[tokio::test]
async fn test_failures_are_classified() {
    let cases = [
        (InferenceError::provider("rate limited"), ErrorCode::OpenAiApiError, true),
        (InferenceError::internal("OpenAI quota exceeded"), ErrorCode::OpenAiApiError, true),
        (InferenceError::timeout("deadline exceeded"), ErrorCode::Timeout, true),
        (InferenceError::invalid_input("text is empty"), ErrorCode::InvalidInput, false),
        (InferenceError::internal("division by zero"), ErrorCode::InternalError, false),
    ];

    for (failure, code, retryable) in cases {
        let harness = Harness::new(
            MockDetector::new(40.0),
            MockFeedback::failing(failure.clone()),
            RecordingCallback::new(),
        );

        let message = Message::new(
            "1-0",
            HashMap::from([("task".to_string(), task_json("t3", "Text.", "cover_letter"))]),
        );
        harness.processor.handle_message(message).await;

        let (_, payload) = &harness.callback.sent()[0];
        let error = payload.error.as_ref().unwrap();
        assert_eq!(error.code, code, "{:?}", failure);
        assert_eq!(error.retryable, retryable, "{:?}", failure);
        assert_eq!(error.message, failure.to_string());
        assert!(payload.result.is_none());
    }
}

#[tokio::test]
async fn test_malformed_messages_are_acked_without_callback() {
    let harness = Harness::new(
        MockDetector::new(50.0),
        MockFeedback::new("ok"),
        RecordingCallback::new(),
    );
    harness.processor.start().await.unwrap();

    harness.publish_fields(HashMap::from([("payload".to_string(), "{}".to_string())]));
    harness.publish("not json");
    harness.publish(r#"{"task_id":"t4","writing_id":"w4","content":"x","writing_type":"poem","callback_url":"http://x/cb"}"#);
    harness.publish(r#"{"task_id":"t5","writing_id":"w5","content":"x","writing_type":"essay","callback_url":"/relative"}"#);
    harness.publish(&task_json("t6", "Valid.", "essay"));

    harness.drain(1).await;

    let sent = harness.callback.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.task_id, "t6");
    assert_eq!(harness.detector.call_count(), 1);
    assert_eq!(harness.backend.pending_count(STREAM, GROUP), 0);

    harness.processor.shutdown().await;
}

#[tokio::test]
async fn test_failed_delivery_still_acks() {
    let harness = Harness::new(
        MockDetector::new(10.0),
        MockFeedback::new("fine"),
        RecordingCallback::failing(),
    );
    harness.processor.start().await.unwrap();

    harness.publish(&task_json("t7", "Text.", "essay"));
    harness.drain(1).await;

    assert_eq!(harness.backend.pending_count(STREAM, GROUP), 0);
    harness.processor.shutdown().await;
}

#[tokio::test]
async fn test_messages_are_handled_one_at_a_time_in_order() {
    let harness = Harness::new(
        MockDetector::new(20.0).with_latency(Duration::from_millis(20)),
        MockFeedback::new("ok"),
        RecordingCallback::new(),
    );
    harness.processor.start().await.unwrap();

    for i in 0..5 {
        harness.publish(&task_json(&format!("t{}", i), "Text.", "essay"));
    }
    harness.drain(5).await;

    let order: Vec<String> = harness
        .callback
        .sent()
        .into_iter()
        .map(|(_, payload)| payload.task_id)
        .collect();
    assert_eq!(order, vec!["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(harness.detector.max_in_flight(), 1);

    harness.processor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_interrupts_blocked_read_and_releases_resources() {
    let backend = MemoryBackend::new();
    let options = ConsumerOptions::new(STREAM, GROUP, "worker_1")
        .with_block_timeout(Duration::from_secs(30));
    let consumer: Arc<dyn Consumer> = Arc::new(StreamConsumer::new(backend.clone(), options));
    let callback = Arc::new(RecordingCallback::new());
    let processor = TaskProcessor::new(
        consumer.clone(),
        services(Arc::new(MockDetector::new(1.0)), Arc::new(MockFeedback::new(""))),
        callback.clone(),
    );

    processor.start().await.unwrap();
    let running = consumer.clone();
    assert!(wait_for(Duration::from_secs(1), || running.state() == ConsumerState::Running).await);

    let started = Instant::now();
    processor.shutdown().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(consumer.state(), ConsumerState::Disconnected);
    assert!(!backend.is_open());
    assert_eq!(callback.close_count(), 1);
}

#[tokio::test]
async fn test_existing_group_does_not_prevent_start() {
    let backend = MemoryBackend::new();
    let first = StreamConsumer::new(backend.clone(), ConsumerOptions::new(STREAM, GROUP, "worker_1"));
    first.connect().await.unwrap();

    let harness_consumer: Arc<dyn Consumer> = Arc::new(StreamConsumer::new(
        backend.clone(),
        ConsumerOptions::new(STREAM, GROUP, "worker_2").with_block_timeout(Duration::from_millis(50)),
    ));
    let callback = Arc::new(RecordingCallback::new());
    let processor = TaskProcessor::new(
        harness_consumer.clone(),
        services(Arc::new(MockDetector::new(5.0)), Arc::new(MockFeedback::new("ok"))),
        callback.clone(),
    );

    processor.start().await.unwrap();
    let running = harness_consumer.clone();
    assert!(wait_for(Duration::from_secs(1), || running.state() == ConsumerState::Running).await);

    backend.append(
        STREAM,
        HashMap::from([("task".to_string(), task_json("t8", "Text.", "essay"))]),
    );
    let sent = callback.clone();
    assert!(wait_for(Duration::from_secs(5), || sent.sent().len() == 1).await);

    processor.shutdown().await;
}
