//! TrueGul Worker
//!
//! Consumes analysis tasks from a consumer-group stream, runs them through the
//! detection and feedback collaborators, reports each outcome to the task's
//! callback URL and acknowledges the entry.
//!
//! - [`mq`]: consumer lifecycle over Redis streams or an in-process log
//! - [`callback`]: signed delivery of callback payloads
//! - [`processor`]: per-message pipeline and the poll loop lifecycle
//! - [`routes`]: synchronous HTTP front-end sharing the same services
//!
//! Every message produces at most one callback attempt followed by exactly one
//! acknowledgement.

pub mod analysis;
pub mod bootstrap;
pub mod callback;
pub mod config;
pub mod mq;
pub mod processor;
pub mod routes;

pub use analysis::AnalysisServices;
pub use callback::{CallbackClient, CallbackSender};
pub use config::Settings;
pub use processor::TaskProcessor;
