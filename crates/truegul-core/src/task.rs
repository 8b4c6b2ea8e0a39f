//! Wire types exchanged with the API server
//!
//! Tasks arrive as JSON inside a single stream field; results leave as JSON
//! callback bodies. Field names here are part of the contract with the API
//! server and must not change.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema version written into every callback and assumed for tasks that omit it
pub const SCHEMA_VERSION: &str = "1";

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Kind of document being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingKind {
    Essay,
    CoverLetter,
}

impl WritingKind {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essay => "essay",
            Self::CoverLetter => "cover_letter",
        }
    }
}

impl fmt::Display for WritingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WritingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "essay" => Ok(Self::Essay),
            "cover_letter" => Ok(Self::CoverLetter),
            other => Err(Error::invalid_task(format!("unknown writing type: {}", other))),
        }
    }
}

/// A unit of work read from the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    /// Payload schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Caller-chosen identifier, echoed in every callback
    pub task_id: String,

    /// Writing this task analyzes
    pub writing_id: String,

    /// Raw text to analyze
    pub content: String,

    /// Essay or cover letter
    #[serde(rename = "writing_type")]
    pub writing_kind: WritingKind,

    /// Absolute URL the outcome is POSTed to
    pub callback_url: String,
}

impl AnalysisTask {
    /// Create a task with the current schema version
    pub fn new(
        task_id: impl Into<String>,
        writing_id: impl Into<String>,
        content: impl Into<String>,
        writing_kind: WritingKind,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            version: default_version(),
            task_id: task_id.into(),
            writing_id: writing_id.into(),
            content: content.into(),
            writing_kind,
            callback_url: callback_url.into(),
        }
    }

    /// Decode and validate a task payload
    pub fn from_json(payload: &str) -> Result<Self> {
        let task: Self = serde_json::from_str(payload)?;
        task.validate()?;
        Ok(task)
    }

    /// Encode as the JSON carried in the queue entry
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.callback_url).map_err(|e| {
            Error::invalid_task(format!("callback_url {:?} is not an absolute URL: {}", self.callback_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_task(format!(
                "callback_url scheme must be http or https, got {}",
                url.scheme()
            )));
        }

        Ok(())
    }
}

/// Successful analysis outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Probability the text is AI-generated, 0-100
    pub ai_probability: f64,

    /// Generated feedback text
    pub feedback: String,

    /// Wall time of detection plus feedback
    pub latency_ms: u64,
}

/// Error codes understood by the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "ML_MODEL_ERROR")]
    MlModelError,
    #[serde(rename = "OPENAI_API_ERROR")]
    OpenAiApiError,
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MlModelError => "ML_MODEL_ERROR",
            Self::OpenAiApiError => "OPENAI_API_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Advisory hint for the receiver's retry policy; nothing here acts on it
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MlModelError | Self::OpenAiApiError | Self::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed analysis outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

/// Callback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Completed,
    Failed,
}

/// Outbound report for one task. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCallback {
    pub version: String,
    pub task_id: String,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AnalysisError>,
}

impl AnalysisCallback {
    /// Callback for a completed task
    pub fn completed(task_id: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            version: default_version(),
            task_id: task_id.into(),
            status: CallbackStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    /// Callback for a failed task
    pub fn failed(task_id: impl Into<String>, error: AnalysisError) -> Self {
        Self {
            version: default_version(),
            task_id: task_id.into(),
            status: CallbackStatus::Failed,
            result: None,
            error: Some(error),
        }
    }
}
