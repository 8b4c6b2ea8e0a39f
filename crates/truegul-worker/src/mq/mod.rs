//! Message queue consumption
//!
//! A [`Consumer`] wraps a consumer-group log into a
//! `disconnected -> connected -> running -> stopping -> disconnected` lifecycle.
//! [`StreamConsumer`] implements the protocol once over any [`StreamBackend`];
//! the backends are Redis streams and an in-process log.

mod memory;
mod redis_streams;
mod stream;

pub use self::memory::MemoryBackend;
pub use self::redis_streams::{RedisBackend, TaskPublisher};
pub use self::stream::{ConsumerOptions, StreamBackend, StreamConsumer};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stream field holding the serialized task
pub const TASK_FIELD: &str = "task";

/// Result type for queue operations
pub type MqResult<T> = std::result::Result<T, MqError>;

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum MqError {
    /// Operation needs an open connection
    #[error("consumer is not connected")]
    NotConnected,

    /// Consumer group creation found an existing group
    #[error("consumer group {0} already exists")]
    GroupExists(String),

    /// Redis client or command failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload encoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl MqError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// One delivered queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Backend-assigned entry id
    pub id: String,

    /// Raw field map of the entry
    pub fields: HashMap<String, String>,
}

impl Message {
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Value of a single field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Consumer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connected,
    Running,
    Stopping,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Handles one delivered message. Failures are the handler's own business.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

/// Consumer-group reader with an explicit lifecycle
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Open the backend and make sure the consumer group exists
    async fn connect(&self) -> MqResult<()>;

    /// Poll until stopped or cancelled, handing each entry to `handler` and
    /// awaiting it before the next read
    async fn start(&self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) -> MqResult<()>;

    /// Ask the poll loop to exit after the current iteration
    fn stop(&self);

    /// Acknowledge an entry; no-op when not connected
    async fn ack(&self, message_id: &str) -> MqResult<()>;

    /// Release the backend connection
    async fn disconnect(&self) -> MqResult<()>;

    fn state(&self) -> ConsumerState;

    /// Consumer identity within its group
    fn name(&self) -> &str;
}
