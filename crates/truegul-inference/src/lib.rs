//! TrueGul Inference
//!
//! Model resolution and the two inference collaborators used by the worker.
//!
//! - [`loader`]: resolves a logical model key to a local path through a primary
//!   loader (remote object store or local directory) and an optional fallback,
//!   caching remote artifacts on disk
//! - [`detector`]: AI-probability scoring of a text, 0-100
//! - [`feedback`]: feedback text for a writing, given its kind and score
//!
//! Collaborators are constructed once at startup and shared read-only.

pub mod detector;
pub mod feedback;
pub mod hub;
pub mod llama;
pub mod loader;
pub mod openai;
pub mod prompts;
pub mod roberta;

pub use detector::{Detector, InferenceResult};
pub use feedback::{DisabledFeedback, FeedbackGenerator, FeedbackProvider};
pub use llama::{LlamaFeedback, LlamaSettings};
pub use loader::{
    LocalModelLoader, ModelLoader, ModelLoaderConfig, ModelLoaderKind, ModelLoaders,
    ObjectSource, RemoteModelLoader, RemoteObject, S3ObjectSource,
};
pub use openai::{OpenAiFeedback, OpenAiSettings};
pub use roberta::RobertaDetector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::detector::Detector;
    pub use crate::feedback::FeedbackGenerator;
    pub use crate::loader::{ModelLoader, ModelLoaders};
}
