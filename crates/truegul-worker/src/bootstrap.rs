//! Startup wiring: model resolution, collaborator construction, consumer choice

use crate::analysis::AnalysisServices;
use crate::config::{DetectorConfig, FeedbackConfig, QueueBackend, QueueConfig, Settings};
use crate::mq::{Consumer, ConsumerOptions, MemoryBackend, RedisBackend, StreamConsumer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use truegul_core::{Error, Result};
use truegul_inference::hub;
use truegul_inference::{
    Detector, DisabledFeedback, FeedbackGenerator, FeedbackProvider, LlamaFeedback,
    LlamaSettings, ModelLoaders, OpenAiFeedback, OpenAiSettings, RobertaDetector,
};

/// Resolve models and build the inference services
pub async fn build_services(settings: &Settings) -> Result<AnalysisServices> {
    let loaders = ModelLoaders::from_config(&settings.model_loader)?;

    let detector = load_detector(&loaders, &settings.detector).await?;
    let feedback = load_feedback(&loaders, settings).await?;

    Ok(AnalysisServices::new(
        detector,
        feedback,
        &settings.detector.version,
    ))
}

/// Detector directory from the loaders, else from the Hugging Face hub
pub async fn resolve_detector_dir(loaders: &ModelLoaders, config: &DetectorConfig) -> Result<PathBuf> {
    if let Some(path) = loaders.ensure_directory(&config.key).await? {
        info!("Using local detector model: {}", path.display());
        return Ok(path);
    }

    hub::fetch_detector(&config.name).await
}

async fn load_detector(loaders: &ModelLoaders, config: &DetectorConfig) -> Result<Arc<dyn Detector>> {
    info!("Loading AI detector model...");
    let model_dir = resolve_detector_dir(loaders, config).await?;
    let max_length = config.max_length;

    let detector = tokio::task::spawn_blocking(move || RobertaDetector::load(&model_dir, max_length))
        .await
        .map_err(|e| Error::internal(format!("detector load task failed: {}", e)))??;

    info!("AI detector model loaded successfully");
    Ok(Arc::new(detector))
}

async fn load_feedback(loaders: &ModelLoaders, settings: &Settings) -> Result<Arc<dyn FeedbackGenerator>> {
    let config = &settings.feedback;

    match config.provider.parse::<FeedbackProvider>()? {
        FeedbackProvider::Local => {
            let model_path = require_file(loaders, settings, &config.key).await?;
            let tokenizer_path = require_file(loaders, settings, &config.tokenizer_key).await?;
            let llama_settings = LlamaSettings {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                ..Default::default()
            };

            let feedback = tokio::task::spawn_blocking(move || {
                LlamaFeedback::load(&model_path, &tokenizer_path, llama_settings)
            })
            .await
            .map_err(|e| Error::internal(format!("feedback load task failed: {}", e)))??;
            Ok(Arc::new(feedback))
        }
        FeedbackProvider::OpenAi => {
            info!("Using hosted feedback model {}", config.model);
            Ok(Arc::new(OpenAiFeedback::new(openai_settings(config))?))
        }
        FeedbackProvider::Disabled => {
            info!("Feedback generation disabled");
            Ok(Arc::new(DisabledFeedback))
        }
    }
}

async fn require_file(loaders: &ModelLoaders, settings: &Settings, key: &str) -> Result<PathBuf> {
    loaders.ensure_file(key).await?.ok_or_else(|| {
        Error::model(format!(
            "Feedback model not found. Set model_loader.bucket or place model at {}/{}",
            settings.model_loader.local_dir.display(),
            key
        ))
    })
}

fn openai_settings(config: &FeedbackConfig) -> OpenAiSettings {
    OpenAiSettings {
        api_base: config.api_base.clone(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        timeout: Duration::from_secs(30),
    }
}

/// Consumer for the configured queue backend
pub fn build_consumer(config: &QueueConfig) -> Result<Arc<dyn Consumer>> {
    let options = ConsumerOptions::from(config);

    let consumer: Arc<dyn Consumer> = match config.backend.parse::<QueueBackend>()? {
        QueueBackend::Redis => Arc::new(StreamConsumer::new(RedisBackend::new(&config.redis_url), options)),
        QueueBackend::Memory => Arc::new(StreamConsumer::new(MemoryBackend::new(), options)),
    };

    Ok(consumer)
}
