//! RoBERTa sequence-classification detector run with Candle

use crate::detector::{label_to_probability, Detector, InferenceResult};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{
    Config as RobertaConfig, XLMRobertaForSequenceClassification,
};
use std::path::Path;
use tokenizers::{Tokenizer, TruncationDirection};
use tracing::info;
use truegul_core::{Error, InferenceError, Result};

/// AI-text detector backed by a fine-tuned RoBERTa classifier.
///
/// The model directory holds `config.json`, `tokenizer.json` and either
/// `model.safetensors` or `pytorch_model.bin`.
pub struct RobertaDetector {
    name: String,
    tokenizer: Tokenizer,
    model: XLMRobertaForSequenceClassification,
    device: Device,
    labels: Vec<String>,
    max_length: usize,
}

impl RobertaDetector {
    /// Load the detector from a resolved model directory
    pub fn load(model_dir: &Path, max_length: usize) -> Result<Self> {
        let config_str = std::fs::read_to_string(model_dir.join("config.json")).map_err(|e| {
            Error::model(format!("failed to read {}/config.json: {}", model_dir.display(), e))
        })?;
        let raw: serde_json::Value = serde_json::from_str(&config_str)?;
        let config: RobertaConfig = serde_json::from_value(raw.clone())
            .map_err(|e| Error::model(format!("failed to parse detector config: {}", e)))?;
        let labels = id2label(&raw);

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| Error::model(format!("failed to load detector tokenizer: {}", e)))?;

        let device = Device::Cpu;
        let vb = load_var_builder(model_dir, &device)?;
        let model = load_sequence_model(&vb, labels.len(), &config)?;

        let name = model_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("roberta-detector")
            .to_string();

        info!("Loaded detector {} with labels {:?}", name, labels);

        Ok(Self {
            name,
            tokenizer,
            model,
            device,
            labels,
            max_length,
        })
    }

    fn classify(&self, text: &str) -> candle_core::Result<(usize, f32)> {
        let mut encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization failed: {}", e)))?;
        encoding.truncate(self.max_length, 0, TruncationDirection::Right);

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids)?;
        let probs: Vec<f32> = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_vec1()?;

        let top = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, 0.0));

        Ok(top)
    }
}

#[async_trait]
impl Detector for RobertaDetector {
    async fn detect(&self, text: &str) -> InferenceResult<f64> {
        if text.trim().is_empty() {
            return Err(InferenceError::invalid_input("text is empty"));
        }

        let (index, score) = self
            .classify(text)
            .map_err(|e| InferenceError::model(format!("detector model inference failed: {}", e)))?;

        let label = self
            .labels
            .get(index)
            .map(String::as_str)
            .unwrap_or("unknown");

        Ok(label_to_probability(label, score))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered class labels from `id2label`, defaulting to a binary human/AI head
fn id2label(config: &serde_json::Value) -> Vec<String> {
    let Some(map) = config.get("id2label").and_then(|v| v.as_object()) else {
        return vec!["Human".to_string(), "ChatGPT".to_string()];
    };

    let mut labels: Vec<(usize, String)> = map
        .iter()
        .filter_map(|(id, label)| Some((id.parse().ok()?, label.as_str()?.to_string())))
        .collect();
    labels.sort_by_key(|(id, _)| *id);
    labels.into_iter().map(|(_, label)| label).collect()
}

fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while mapped
        return unsafe {
            VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)
                .map_err(|e| Error::model(format!("failed to load detector weights: {}", e)))
        };
    }

    let pytorch = model_dir.join("pytorch_model.bin");
    if pytorch.exists() {
        return VarBuilder::from_pth(&pytorch, DType::F32, device)
            .map_err(|e| Error::model(format!("failed to load detector weights: {}", e)));
    }

    Err(Error::model(format!(
        "no model.safetensors or pytorch_model.bin in {}",
        model_dir.display()
    )))
}

fn load_sequence_model(
    vb: &VarBuilder,
    num_labels: usize,
    config: &RobertaConfig,
) -> Result<XLMRobertaForSequenceClassification> {
    let mut errors = Vec::new();

    for prefix in ["", "model"] {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(prefix)
        };

        match XLMRobertaForSequenceClassification::new(num_labels, config, vb_prefix) {
            Ok(model) => return Ok(model),
            Err(e) => errors.push(format!("{}: {}", if prefix.is_empty() { "<root>" } else { prefix }, e)),
        }
    }

    Err(Error::model(format!(
        "failed to load detector model, tried prefixes [{}]",
        errors.join(" | ")
    )))
}
