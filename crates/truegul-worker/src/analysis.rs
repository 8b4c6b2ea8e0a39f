//! Detection plus feedback, shared by the queue worker and the HTTP API

use std::sync::Arc;
use std::time::Instant;
use truegul_core::{AnalysisResult, WritingKind};
use truegul_inference::{Detector, FeedbackGenerator, InferenceResult};

/// Inference collaborators, built once at startup and shared read-only
#[derive(Clone)]
pub struct AnalysisServices {
    pub detector: Arc<dyn Detector>,
    pub feedback: Arc<dyn FeedbackGenerator>,
    /// Detector version reported by the analyze API
    pub model_version: String,
}

impl AnalysisServices {
    pub fn new(
        detector: Arc<dyn Detector>,
        feedback: Arc<dyn FeedbackGenerator>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            feedback,
            model_version: model_version.into(),
        }
    }

    /// Score `content`, then generate feedback for it.
    ///
    /// Latency covers both calls.
    pub async fn analyze(&self, content: &str, kind: WritingKind) -> InferenceResult<AnalysisResult> {
        let started = Instant::now();

        let ai_probability = self.detector.detect(content).await?;
        let feedback = self.feedback.generate(content, kind, ai_probability).await?;

        Ok(AnalysisResult {
            ai_probability,
            feedback,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
