//! Detection collaborator

use async_trait::async_trait;
use truegul_core::InferenceError;

/// Result type for collaborator calls
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Scores how likely a text is to be AI-generated
#[async_trait]
pub trait Detector: Send + Sync {
    /// Probability in `[0, 100]` that `text` is AI-generated
    async fn detect(&self, text: &str) -> InferenceResult<f64>;

    /// Detector name for logs
    fn name(&self) -> &str;
}

/// Labels a classifier uses for the machine-written class
const AI_LABELS: [&str; 4] = ["chatgpt", "ai", "fake", "machine"];

/// Convert the top label and its confidence into an AI probability.
///
/// When the top label is the human class the probability is the complement.
pub fn label_to_probability(label: &str, score: f32) -> f64 {
    let score = f64::from(score.clamp(0.0, 1.0));
    if AI_LABELS.contains(&label.to_lowercase().as_str()) {
        score * 100.0
    } else {
        (1.0 - score) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_label_keeps_score() {
        assert!((label_to_probability("ChatGPT", 0.9) - 90.0).abs() < 1e-4);
        assert!((label_to_probability("Fake", 0.75) - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_human_label_is_complement() {
        assert!((label_to_probability("Human", 0.9) - 10.0).abs() < 1e-4);
        assert!((label_to_probability("Real", 1.0)).abs() < 1e-4);
    }
}
