//! Hosted feedback through an OpenAI-compatible chat completions API

use crate::detector::InferenceResult;
use crate::feedback::FeedbackGenerator;
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use truegul_core::{Error, InferenceError, Result, WritingKind};

/// Connection and sampling parameters for the hosted provider
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Feedback generator calling a chat completions endpoint
pub struct OpenAiFeedback {
    client: reqwest::Client,
    endpoint: String,
    settings: OpenAiSettings,
}

impl OpenAiFeedback {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build openai client: {}", e)))?;
        let endpoint = format!("{}/chat/completions", settings.api_base.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }
}

fn request_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::timeout(format!("openai request timed out: {}", e))
    } else {
        InferenceError::provider(format!("openai request failed: {}", e))
    }
}

#[async_trait]
impl FeedbackGenerator for OpenAiFeedback {
    async fn generate(
        &self,
        text: &str,
        kind: WritingKind,
        ai_probability: f64,
    ) -> InferenceResult<String> {
        let system = prompts::system_prompt(kind);
        let user = prompts::user_prompt(text, kind, ai_probability);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(InferenceError::provider(format!(
                "openai returned {}: {}",
                status, detail
            )));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                request_error(e)
            } else {
                InferenceError::provider(format!("openai response could not be parsed: {}", e))
            }
        })?;

        debug!("openai returned {} choices", reply.choices.len());

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| InferenceError::provider("openai response contained no choices"))
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}
