//! Worker configuration
//!
//! Layered: built-in defaults, then an optional YAML file, then `TRUEGUL_*`
//! environment variables (`__` separates sections, e.g.
//! `TRUEGUL_QUEUE__REDIS_URL`), then explicit command line overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use truegul_core::{Error, Result};
use truegul_inference::{FeedbackProvider, ModelLoaderConfig, ModelLoaderKind};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TRUEGUL";

/// Complete worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub callback: CallbackConfig,

    #[serde(default)]
    pub model_loader: ModelLoaderConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub redis_url: Option<String>,
    pub callback_secret: Option<String>,
    pub consumer_name: Option<String>,
    pub port: Option<u16>,
}

impl Settings {
    /// Load configuration from `path` (skipped when absent) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("failed to load configuration: {}", e)))?;

        Ok(settings)
    }

    /// Apply command line overrides
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(redis_url) = overrides.redis_url {
            self.queue.redis_url = redis_url;
        }
        if let Some(secret) = overrides.callback_secret {
            self.callback.secret = secret;
        }
        if let Some(consumer_name) = overrides.consumer_name {
            self.queue.consumer_name = consumer_name;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    /// Check every enumerated setting and fill in the consumer identity.
    ///
    /// Unsupported loader kinds, queue backends and feedback providers are
    /// fatal here rather than at first use.
    pub fn finalize(mut self) -> Result<Self> {
        self.model_loader.loader_type.parse::<ModelLoaderKind>()?;
        self.queue.backend.parse::<QueueBackend>()?;
        self.feedback.provider.parse::<FeedbackProvider>()?;

        if self.queue.consumer_name.trim().is_empty() {
            self.queue.consumer_name = format!("worker-{}", uuid::Uuid::new_v4());
        }

        Ok(self)
    }
}

/// HTTP front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve the synchronous analyze API next to the worker
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enabled: true,
        }
    }
}

/// Queue backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Redis,
    Memory,
}

impl FromStr for QueueBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(Error::config(format!("Unsupported queue backend: {}", other))),
        }
    }
}

/// Task stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// `redis` or `memory`
    #[serde(default = "default_queue_backend")]
    pub backend: String,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Identity within the group; empty generates a unique one
    #[serde(default)]
    pub consumer_name: String,

    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,

    /// Pause after a failed read
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            redis_url: default_redis_url(),
            stream_name: default_stream_name(),
            consumer_group: default_consumer_group(),
            consumer_name: String::new(),
            block_timeout_ms: default_block_timeout_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

/// Callback delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Sent as `X-Callback-Secret`
    #[serde(default)]
    pub secret: String,

    #[serde(default = "default_callback_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            timeout_secs: default_callback_timeout_secs(),
        }
    }
}

/// Detector model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Hugging Face repository used when the loaders cannot provide the model
    #[serde(default = "default_detector_name")]
    pub name: String,

    /// Model directory key for the loader chain
    #[serde(default = "default_detector_key")]
    pub key: String,

    /// Reported as `model_version` by the analyze API
    #[serde(default = "default_detector_version")]
    pub version: String,

    /// Token limit for detector input
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name: default_detector_name(),
            key: default_detector_key(),
            version: default_detector_version(),
            max_length: default_max_length(),
        }
    }
}

/// Feedback generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// `local`, `openai` or `disabled`
    #[serde(default = "default_feedback_provider")]
    pub provider: String,

    /// GGUF model file key for the loader chain
    #[serde(default = "default_feedback_key")]
    pub key: String,

    #[serde(default = "default_tokenizer_key")]
    pub tokenizer_key: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            provider: default_feedback_provider(),
            key: default_feedback_key(),
            tokenizer_key: default_tokenizer_key(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_openai_model(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_queue_backend() -> String {
    "redis".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_stream_name() -> String {
    "analysis_tasks".to_string()
}

fn default_consumer_group() -> String {
    "ml_workers".to_string()
}

fn default_block_timeout_ms() -> u64 {
    5000
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_callback_timeout_secs() -> u64 {
    30
}

fn default_detector_name() -> String {
    "Hello-SimpleAI/chatgpt-detector-roberta".to_string()
}

fn default_detector_key() -> String {
    "detector/chatgpt-detector-roberta".to_string()
}

fn default_detector_version() -> String {
    "0.1.0".to_string()
}

fn default_max_length() -> usize {
    512
}

fn default_feedback_provider() -> String {
    "disabled".to_string()
}

fn default_feedback_key() -> String {
    "feedback/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf".to_string()
}

fn default_tokenizer_key() -> String {
    "feedback/tokenizer.json".to_string()
}

fn default_max_tokens() -> usize {
    256
}

fn default_temperature() -> f64 {
    0.7
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
