//! Callback delivery to the API server

use crate::config::CallbackConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use truegul_core::{AnalysisCallback, Error, Result};

/// Header carrying the shared secret
pub const CALLBACK_SECRET_HEADER: &str = "X-Callback-Secret";

/// Delivers a callback payload. Never fails; the outcome is only reported.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    /// POST `payload` to `url`, true on a 2xx response
    async fn send_callback(&self, url: &str, payload: &AnalysisCallback) -> bool;

    /// Release the HTTP transport; later sends report false
    async fn close(&self);
}

/// HTTP callback client with a fixed timeout and shared-secret header.
///
/// No retries: a failed delivery is logged and reported as `false`.
pub struct CallbackClient {
    secret: String,
    client: Mutex<Option<reqwest::Client>>,
}

impl CallbackClient {
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build callback client: {}", e)))?;

        Ok(Self {
            secret: secret.into(),
            client: Mutex::new(Some(client)),
        })
    }

    pub fn from_config(config: &CallbackConfig) -> Result<Self> {
        if config.secret.is_empty() {
            warn!("Callback secret is empty, receivers will reject callbacks");
        }
        Self::new(&config.secret, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl CallbackSender for CallbackClient {
    async fn send_callback(&self, url: &str, payload: &AnalysisCallback) -> bool {
        let client = self.client.lock().clone();
        let Some(client) = client else {
            error!("Callback for task {} dropped, client is closed", payload.task_id);
            return false;
        };

        let response = client
            .post(url)
            .header(CALLBACK_SECRET_HEADER, &self.secret)
            .json(payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!("Callback sent successfully for task {}", payload.task_id);
                true
            }
            Ok(response) => {
                error!(
                    "Callback failed for task {}: HTTP {}",
                    payload.task_id,
                    response.status()
                );
                false
            }
            Err(e) => {
                error!("Callback failed for task {}: {}", payload.task_id, e);
                false
            }
        }
    }

    async fn close(&self) {
        if self.client.lock().take().is_some() {
            debug!("Callback client closed");
        }
    }
}
