//! Feedback collaborator

use crate::detector::InferenceResult;
use async_trait::async_trait;
use std::str::FromStr;
use truegul_core::{Error, WritingKind};

/// Produces feedback text for a writing
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    /// Feedback for `text`, given its kind and AI probability
    async fn generate(
        &self,
        text: &str,
        kind: WritingKind,
        ai_probability: f64,
    ) -> InferenceResult<String>;

    /// Generator name for logs
    fn name(&self) -> &str;
}

/// Which feedback generator to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackProvider {
    /// Quantized GGUF chat model run locally
    Local,
    /// OpenAI-compatible chat completions endpoint
    OpenAi,
    /// Always returns empty feedback
    Disabled,
}

impl FromStr for FeedbackProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(Error::config(format!("Unsupported feedback provider: {}", other))),
        }
    }
}

/// Generator used while no feedback model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledFeedback;

#[async_trait]
impl FeedbackGenerator for DisabledFeedback {
    async fn generate(
        &self,
        _text: &str,
        _kind: WritingKind,
        _ai_probability: f64,
    ) -> InferenceResult<String> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
