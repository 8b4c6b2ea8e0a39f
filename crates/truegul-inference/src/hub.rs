//! Hugging Face hub fallback for the detector model

use hf_hub::api::sync::Api;
use hf_hub::Repo;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use truegul_core::{Error, Result};

/// Files a sequence classifier directory must contain
const DETECTOR_FILES: [&str; 2] = ["config.json", "tokenizer.json"];

/// Weight files in preference order; the first one the repo serves wins
const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Download the detector files for `repo` into the hub cache and return the
/// snapshot directory that holds them
pub async fn fetch_detector(repo: &str) -> Result<PathBuf> {
    let repo = repo.to_string();

    tokio::task::spawn_blocking(move || fetch_blocking(&repo))
        .await
        .map_err(|e| Error::internal(format!("hub download task failed: {}", e)))?
}

fn fetch_blocking(repo: &str) -> Result<PathBuf> {
    info!("Loading detector model from HuggingFace hub: {}", repo);

    let api = Api::new()
        .map_err(|e| Error::model(format!("Failed to initialize HuggingFace API: {}", e)))?;
    let repo_api = api.repo(Repo::model(repo.to_string()));

    let mut download = |file: &str| {
        debug!("Downloading {} from {}", file, repo);
        repo_api
            .get(file)
            .map_err(|e| Error::model(format!("Failed to download {} from {}: {}", file, repo, e)))
    };

    for file in DETECTOR_FILES {
        download(file)?;
    }
    let weights = first_available(&WEIGHT_FILES, &mut download)?;

    weights
        .parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| Error::model(format!("Invalid hub cache path for {}", repo)))
}

/// Fetch the first candidate that downloads, returning the last error if none do
fn first_available<F>(candidates: &[&str], fetch: &mut F) -> Result<PathBuf>
where
    F: FnMut(&str) -> Result<PathBuf>,
{
    let mut last_error = None;
    for file in candidates {
        match fetch(file) {
            Ok(path) => return Ok(path),
            Err(e) => {
                warn!("{}", e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::model("no weight files to download")))
}
