//! Task processing pipeline
//!
//! Per message: decode the task, run detection and feedback, send one
//! callback, then acknowledge. The acknowledgement is unconditional; a task
//! that fails is reported to the receiver and never redelivered by the queue.
//! The `retryable` flag in a failure callback is only a hint for the receiver.

use crate::analysis::AnalysisServices;
use crate::callback::CallbackSender;
use crate::mq::{Consumer, Message, MessageHandler, MqResult, TASK_FIELD};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use truegul_core::{AnalysisCallback, AnalysisTask, ErrorCode};

/// Task id logged when a payload cannot be decoded
pub const UNKNOWN_TASK_ID: &str = "unknown";

/// Handles one message end to end, acknowledging it last
struct TaskHandler {
    consumer: Arc<dyn Consumer>,
    services: AnalysisServices,
    callback: Arc<dyn CallbackSender>,
}

impl TaskHandler {
    async fn process(&self, message: &Message) {
        let Some(raw) = message.field(TASK_FIELD) else {
            warn!(
                "Message {} has no {} field, acknowledging without callback",
                message.id, TASK_FIELD
            );
            metrics::counter!("truegul_malformed_messages_total").increment(1);
            return;
        };

        let task = match AnalysisTask::from_json(raw) {
            Ok(task) => task,
            Err(e) => {
                error!(
                    "Discarding message {} (task {}): {} {}",
                    message.id,
                    UNKNOWN_TASK_ID,
                    ErrorCode::InvalidInput,
                    e
                );
                metrics::counter!("truegul_malformed_messages_total").increment(1);
                return;
            }
        };

        info!("Processing task {} (message {})", task.task_id, message.id);

        let payload = match self.services.analyze(&task.content, task.writing_kind).await {
            Ok(result) => {
                info!(
                    "Task {} completed: ai_probability={:.2}, latency={}ms",
                    task.task_id, result.ai_probability, result.latency_ms
                );
                metrics::counter!("truegul_tasks_total", "status" => "completed").increment(1);
                metrics::histogram!("truegul_task_latency_ms").record(result.latency_ms as f64);
                AnalysisCallback::completed(&task.task_id, result)
            }
            Err(e) => {
                let failure = e.to_analysis_error();
                error!(
                    "Task {} failed: {} {} (retryable={})",
                    task.task_id, failure.code, failure.message, failure.retryable
                );
                metrics::counter!("truegul_tasks_total", "status" => "failed").increment(1);
                AnalysisCallback::failed(&task.task_id, failure)
            }
        };

        let delivered = self.callback.send_callback(&task.callback_url, &payload).await;
        let outcome = if delivered { "delivered" } else { "failed" };
        metrics::counter!("truegul_callbacks_total", "outcome" => outcome).increment(1);
        debug!("Callback for task {}: {}", task.task_id, outcome);
    }
}

#[async_trait]
impl MessageHandler for TaskHandler {
    async fn handle(&self, message: Message) {
        self.process(&message).await;

        if let Err(e) = self.consumer.ack(&message.id).await {
            error!("Failed to acknowledge message {}: {}", message.id, e);
        }
    }
}

/// Owns the consumer and the callback client for the life of the process
pub struct TaskProcessor {
    consumer: Arc<dyn Consumer>,
    callback: Arc<dyn CallbackSender>,
    handler: Arc<TaskHandler>,
    cancel: CancellationToken,
    poll_loop: Mutex<Option<JoinHandle<()>>>,
}

impl TaskProcessor {
    pub fn new(
        consumer: Arc<dyn Consumer>,
        services: AnalysisServices,
        callback: Arc<dyn CallbackSender>,
    ) -> Self {
        let handler = Arc::new(TaskHandler {
            consumer: Arc::clone(&consumer),
            services,
            callback: Arc::clone(&callback),
        });

        Self {
            consumer,
            callback,
            handler,
            cancel: CancellationToken::new(),
            poll_loop: Mutex::new(None),
        }
    }

    pub fn consumer(&self) -> &Arc<dyn Consumer> {
        &self.consumer
    }

    /// Process and acknowledge a single message
    pub async fn handle_message(&self, message: Message) {
        self.handler.handle(message).await;
    }

    /// Connect the consumer and spawn the poll loop
    pub async fn start(&self) -> MqResult<()> {
        self.consumer.connect().await?;

        let consumer = Arc::clone(&self.consumer);
        let handler: Arc<dyn MessageHandler> = self.handler.clone();
        let cancel = self.cancel.clone();

        let poll_loop = tokio::spawn(async move {
            if let Err(e) = consumer.start(handler, cancel).await {
                error!("Consumer loop exited with error: {}", e);
            }
        });
        *self.poll_loop.lock() = Some(poll_loop);

        info!("Task processor started (consumer {})", self.consumer.name());
        Ok(())
    }

    /// Stop consuming and release the queue connection and HTTP client.
    ///
    /// Interrupts a blocked read but lets an in-flight message finish, so no
    /// message is left half handled.
    pub async fn shutdown(&self) {
        info!("Shutting down task processor");

        self.consumer.stop();
        self.cancel.cancel();

        let poll_loop = self.poll_loop.lock().take();
        if let Some(poll_loop) = poll_loop {
            if let Err(e) = poll_loop.await {
                error!("Consumer loop task failed: {}", e);
            }
        }

        if let Err(e) = self.consumer.disconnect().await {
            error!("Failed to disconnect consumer: {}", e);
        }
        self.callback.close().await;

        info!("Task processor stopped");
    }
}
