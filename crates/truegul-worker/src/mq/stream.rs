//! Consumer-group poll loop shared by every stream backend

use super::{Consumer, ConsumerState, Message, MessageHandler, MqError, MqResult};
use crate::config::QueueConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Primitive operations of a consumer-group log
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Open the client connection
    async fn open(&self) -> MqResult<()>;

    /// Create `group` on `stream` reading from the start of the log, creating
    /// the stream if needed. An existing group yields [`MqError::GroupExists`].
    async fn create_group(&self, stream: &str, group: &str) -> MqResult<()>;

    /// Block up to `block` for one entry never delivered to the group, claiming
    /// it for `consumer`. `None` on timeout.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> MqResult<Option<Message>>;

    /// Remove `id` from the group's pending entries
    async fn ack(&self, stream: &str, group: &str, id: &str) -> MqResult<()>;

    /// Drop the client connection
    async fn close(&self) -> MqResult<()>;
}

/// Identity and timing of a stream consumer
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub block_timeout: Duration,
    pub error_backoff: Duration,
}

impl ConsumerOptions {
    pub fn new(stream: impl Into<String>, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            block_timeout: Duration::from_millis(5000),
            error_backoff: Duration::from_millis(1000),
        }
    }

    pub fn with_block_timeout(mut self, block_timeout: Duration) -> Self {
        self.block_timeout = block_timeout;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }
}

impl From<&QueueConfig> for ConsumerOptions {
    fn from(config: &QueueConfig) -> Self {
        Self::new(&config.stream_name, &config.consumer_group, &config.consumer_name)
            .with_block_timeout(Duration::from_millis(config.block_timeout_ms))
            .with_error_backoff(Duration::from_millis(config.error_backoff_ms))
    }
}

/// Consumer-group reader over a [`StreamBackend`].
///
/// Reads one entry at a time and awaits the handler before reading again.
pub struct StreamConsumer<B> {
    backend: B,
    options: ConsumerOptions,
    state: Mutex<ConsumerState>,
    running: AtomicBool,
}

impl<B: StreamBackend> StreamConsumer<B> {
    pub fn new(backend: B, options: ConsumerOptions) -> Self {
        Self {
            backend,
            options,
            state: Mutex::new(ConsumerState::Disconnected),
            running: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock() = state;
    }

    async fn read_next(&self) -> MqResult<Option<Message>> {
        self.backend
            .read_group(
                &self.options.stream,
                &self.options.group,
                &self.options.consumer,
                self.options.block_timeout,
            )
            .await
    }
}

#[async_trait]
impl<B: StreamBackend> Consumer for StreamConsumer<B> {
    async fn connect(&self) -> MqResult<()> {
        self.backend.open().await?;

        match self
            .backend
            .create_group(&self.options.stream, &self.options.group)
            .await
        {
            Ok(()) => info!(
                "Created consumer group {} on stream {}",
                self.options.group, self.options.stream
            ),
            Err(MqError::GroupExists(_)) => debug!(
                "Consumer group {} already exists on stream {}",
                self.options.group, self.options.stream
            ),
            Err(e) => {
                let _ = self.backend.close().await;
                return Err(e);
            }
        }

        self.set_state(ConsumerState::Connected);
        info!(
            "Consumer {} connected to stream {} (group {})",
            self.options.consumer, self.options.stream, self.options.group
        );
        Ok(())
    }

    async fn start(&self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) -> MqResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ConsumerState::Connected => *state = ConsumerState::Running,
                ConsumerState::Disconnected => return Err(MqError::NotConnected),
                other => return Err(MqError::backend(format!("consumer is already {}", other))),
            }
        }
        self.running.store(true, Ordering::SeqCst);

        info!("Consumer {} started", self.options.consumer);

        while self.running.load(Ordering::SeqCst) {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.read_next() => read,
            };

            match read {
                Ok(Some(message)) => {
                    debug!("Received message {}", message.id);
                    handler.handle(message).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error reading from stream {}: {}", self.options.stream, e);
                    metrics::counter!("truegul_consumer_errors_total").increment(1);

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.options.error_backoff) => {}
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if matches!(*state, ConsumerState::Running | ConsumerState::Stopping) {
                *state = ConsumerState::Connected;
            }
        }

        info!("Consumer {} stopped", self.options.consumer);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let mut state = self.state.lock();
        if *state == ConsumerState::Running {
            *state = ConsumerState::Stopping;
        }
    }

    async fn ack(&self, message_id: &str) -> MqResult<()> {
        if self.state() == ConsumerState::Disconnected {
            warn!("Ack for {} skipped, consumer not connected", message_id);
            return Ok(());
        }

        self.backend
            .ack(&self.options.stream, &self.options.group, message_id)
            .await
    }

    async fn disconnect(&self) -> MqResult<()> {
        self.running.store(false, Ordering::SeqCst);

        if self.state() == ConsumerState::Disconnected {
            return Ok(());
        }

        self.backend.close().await?;
        self.set_state(ConsumerState::Disconnected);
        info!("Consumer {} disconnected", self.options.consumer);
        Ok(())
    }

    fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    fn name(&self) -> &str {
        &self.options.consumer
    }
}
