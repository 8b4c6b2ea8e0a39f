//! Mock collaborators for worker tests
//!
//! Configurable detector, feedback generator and callback sender that record
//! how they were called.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use truegul_core::{AnalysisCallback, InferenceError, WritingKind};
use truegul_inference::{Detector, FeedbackGenerator, InferenceResult};
use truegul_worker::{AnalysisServices, CallbackSender};

/// Detector returning a fixed score or a fixed failure
pub struct MockDetector {
    score: f64,
    failure: Option<InferenceError>,
    latency: Option<Duration>,
    call_count: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDetector {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            failure: None,
            latency: None,
            call_count: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(failure: InferenceError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(0.0)
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `detect` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for MockDetector {
    async fn detect(&self, _text: &str) -> InferenceResult<f64> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(self.score),
        }
    }

    fn name(&self) -> &str {
        "mock-detector"
    }
}

/// Feedback generator returning fixed text or a fixed failure
pub struct MockFeedback {
    text: String,
    failure: Option<InferenceError>,
    calls: Mutex<Vec<(WritingKind, f64)>>,
}

impl MockFeedback {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: InferenceError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new("")
        }
    }

    /// Writing kind and score of every call
    pub fn calls(&self) -> Vec<(WritingKind, f64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FeedbackGenerator for MockFeedback {
    async fn generate(
        &self,
        _text: &str,
        kind: WritingKind,
        ai_probability: f64,
    ) -> InferenceResult<String> {
        self.calls.lock().push((kind, ai_probability));

        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(self.text.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-feedback"
    }
}

/// Callback sender that records every payload
pub struct RecordingCallback {
    deliver: bool,
    sent: Mutex<Vec<(String, AnalysisCallback)>>,
    close_count: AtomicU32,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self {
            deliver: true,
            sent: Mutex::new(Vec::new()),
            close_count: AtomicU32::new(0),
        }
    }

    /// Report every delivery as failed
    pub fn failing() -> Self {
        Self {
            deliver: false,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<(String, AnalysisCallback)> {
        self.sent.lock().clone()
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallbackSender for RecordingCallback {
    async fn send_callback(&self, url: &str, payload: &AnalysisCallback) -> bool {
        self.sent.lock().push((url.to_string(), payload.clone()));
        self.deliver
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn services(detector: Arc<MockDetector>, feedback: Arc<MockFeedback>) -> AnalysisServices {
    AnalysisServices::new(detector, feedback, "0.1.0")
}

pub fn task_json(task_id: &str, content: &str, writing_type: &str) -> String {
    serde_json::json!({
        "task_id": task_id,
        "writing_id": format!("w-{}", task_id),
        "content": content,
        "writing_type": writing_type,
        "callback_url": "http://x/cb",
    })
    .to_string()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
