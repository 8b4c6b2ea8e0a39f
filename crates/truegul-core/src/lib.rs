//! TrueGul Core
//!
//! Types and errors shared by the TrueGul ML worker crates.
//!
//! This crate provides:
//! - Wire types for analysis tasks read from the queue and callbacks sent to the API server
//! - The typed failure returned by inference collaborators and its mapping to callback error codes
//! - Error types and result handling

pub mod error;
pub mod failure;
pub mod task;

pub use error::{Error, Result};
pub use failure::InferenceError;
pub use task::{
    AnalysisCallback, AnalysisError, AnalysisResult, AnalysisTask, CallbackStatus, ErrorCode,
    WritingKind, SCHEMA_VERSION,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::failure::InferenceError;
    pub use crate::task::{AnalysisCallback, AnalysisTask, ErrorCode, WritingKind};
}
