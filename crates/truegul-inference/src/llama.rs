//! Local feedback generation with a quantized GGUF llama model

use crate::detector::InferenceResult;
use crate::feedback::FeedbackGenerator;
use crate::prompts;
use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};
use truegul_core::{Error, InferenceError, Result, WritingKind};

const EOS_TOKEN: &str = "</s>";

/// Sampling parameters for local generation
#[derive(Debug, Clone)]
pub struct LlamaSettings {
    pub max_tokens: usize,
    pub temperature: f64,
    pub context_length: usize,
    pub seed: u64,
}

impl Default for LlamaSettings {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            context_length: 2048,
            seed: 299792458,
        }
    }
}

struct LlamaModel {
    weights: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: Option<u32>,
    settings: LlamaSettings,
}

/// Feedback generator running a quantized chat model on the CPU.
///
/// Generation holds the model lock for the whole request; requests are
/// served one at a time.
pub struct LlamaFeedback {
    name: String,
    model: Arc<LlamaModel>,
}

impl LlamaFeedback {
    pub fn load(model_path: &Path, tokenizer_path: &Path, settings: LlamaSettings) -> Result<Self> {
        info!("Loading feedback model: {}", model_path.display());

        let device = Device::Cpu;
        let mut file = std::fs::File::open(model_path).map_err(|e| {
            Error::model(format!("failed to open feedback model {}: {}", model_path.display(), e))
        })?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| Error::model(format!("failed to read GGUF header: {}", e)))?;
        let weights = ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(|e| Error::model(format!("failed to load feedback model weights: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| Error::model(format!("failed to load feedback tokenizer: {}", e)))?;
        let eos_token = tokenizer.token_to_id(EOS_TOKEN);

        let name = model_path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("llama")
            .to_string();

        info!("Feedback model loaded successfully");

        Ok(Self {
            name,
            model: Arc::new(LlamaModel {
                weights: Mutex::new(weights),
                tokenizer,
                device,
                eos_token,
                settings,
            }),
        })
    }
}

impl LlamaModel {
    fn complete(&self, prompt: &str) -> candle_core::Result<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization failed: {}", e)))?;

        let budget = self
            .settings
            .context_length
            .saturating_sub(self.settings.max_tokens)
            .max(1);
        let ids = encoding.get_ids();
        let prompt_tokens = &ids[ids.len().saturating_sub(budget)..];

        let temperature = (self.settings.temperature > 0.0).then_some(self.settings.temperature);
        let mut sampler = LogitsProcessor::new(self.settings.seed, temperature, None);
        let mut weights = self.weights.lock();

        let input = Tensor::new(prompt_tokens, &self.device)?.unsqueeze(0)?;
        let logits = weights.forward(&input, 0)?.squeeze(0)?;
        let mut next = sampler.sample(&logits)?;

        let mut generated = Vec::with_capacity(self.settings.max_tokens);
        for index in 0..self.settings.max_tokens {
            if Some(next) == self.eos_token {
                break;
            }
            generated.push(next);

            let input = Tensor::new(&[next], &self.device)?.unsqueeze(0)?;
            let logits = weights
                .forward(&input, prompt_tokens.len() + index)?
                .squeeze(0)?;
            next = sampler.sample(&logits)?;
        }

        debug!("Generated {} feedback tokens", generated.len());

        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| candle_core::Error::Msg(format!("detokenization failed: {}", e)))
    }
}

#[async_trait]
impl FeedbackGenerator for LlamaFeedback {
    async fn generate(
        &self,
        text: &str,
        kind: WritingKind,
        ai_probability: f64,
    ) -> InferenceResult<String> {
        let prompt = prompts::chat_template(
            &prompts::system_prompt(kind),
            &prompts::user_prompt(text, kind, ai_probability),
        );

        let model = Arc::clone(&self.model);
        let output = tokio::task::spawn_blocking(move || model.complete(&prompt))
            .await
            .map_err(|e| InferenceError::internal(format!("feedback generation task failed: {}", e)))?
            .map_err(|e| InferenceError::model(format!("feedback model generation failed: {}", e)))?;

        Ok(output.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model_is_model_error() {
        let result = LlamaFeedback::load(
            Path::new("/nonexistent/model.gguf"),
            Path::new("/nonexistent/tokenizer.json"),
            LlamaSettings::default(),
        );
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
