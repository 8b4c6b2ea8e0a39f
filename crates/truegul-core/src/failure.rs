//! Typed failures from the detection and feedback collaborators
//!
//! The API server only sees an [`ErrorCode`], a message and a retryable hint.
//! Collaborators tag their failures with a variant so the code does not have to
//! be guessed from the text; untagged failures fall back to matching the
//! lowercased message.

use crate::task::{AnalysisError, ErrorCode};

/// Name of the hosted feedback provider as it appears in failure messages
pub const FEEDBACK_PROVIDER_NAME: &str = "openai";

/// Failure raised by a detection or feedback collaborator.
///
/// `Display` is the bare message; it is sent verbatim as `error.message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// Local model missing, failed to load, or failed during inference
    #[error("{0}")]
    Model(String),

    /// Hosted feedback provider rejected or failed the request
    #[error("{0}")]
    Provider(String),

    /// Input the collaborator cannot process
    #[error("{0}")]
    InvalidInput(String),

    /// Collaborator did not answer in time
    #[error("{0}")]
    Timeout(String),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl InferenceError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Error code reported to the receiver
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Model(_) => ErrorCode::MlModelError,
            Self::Provider(_) => ErrorCode::OpenAiApiError,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Internal(msg) => classify_message(msg),
        }
    }

    /// Callback error body for this failure
    pub fn to_analysis_error(&self) -> AnalysisError {
        let code = self.code();
        AnalysisError {
            code,
            message: self.to_string(),
            retryable: code.is_retryable(),
        }
    }
}

/// Classify an untagged failure message.
///
/// "model" wins over the provider name when both appear.
pub fn classify_message(message: &str) -> ErrorCode {
    let lowered = message.to_lowercase();
    if lowered.contains("model") {
        ErrorCode::MlModelError
    } else if lowered.contains(FEEDBACK_PROVIDER_NAME) {
        ErrorCode::OpenAiApiError
    } else {
        ErrorCode::InternalError
    }
}
