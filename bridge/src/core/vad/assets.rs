//! Silero model download and cache resolution
//!
//! The model lives either at an explicit `model_path` or in
//! `<cache_path>/vad/silero_vad.onnx`. Only `telephony-bridge init` downloads;
//! sessions resolve the file and fail fast when it is missing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

use super::config::VADConfig;

const MODEL_FILENAME: &str = "silero_vad.onnx";

/// Where the model for a configuration is expected
fn expected_location(config: &VADConfig) -> Result<PathBuf> {
    if let Some(path) = &config.model_path {
        return Ok(path.clone());
    }
    let cache_dir = config
        .model_cache_dir()
        .context("Neither VAD_MODEL_PATH nor CACHE_PATH is set")?;
    Ok(cache_dir.join(MODEL_FILENAME))
}

/// Ensure the model exists locally, downloading it into the cache when missing.
///
/// An explicit `model_path` is never downloaded to.
pub async fn download_model(config: &VADConfig) -> Result<PathBuf> {
    let path = expected_location(config)?;
    if path.exists() {
        info!("VAD model already present at {:?}", path);
        return Ok(path);
    }
    if config.model_path.is_some() {
        bail!("VAD model file {:?} does not exist", path);
    }

    let url = config
        .model_url
        .as_deref()
        .context("VAD model is not cached and no download URL is configured")?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }

    info!("Fetching VAD model from {}", url);
    fetch(url, &path).await?;
    Ok(path)
}

/// Resolve the model file without touching the network
pub fn model_path(config: &VADConfig) -> Result<PathBuf> {
    let path = expected_location(config)?;
    if !path.exists() {
        bail!(
            "VAD model missing at {:?}; run `telephony-bridge init` first",
            path
        );
    }
    Ok(path)
}

async fn fetch(url: &str, path: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Request to {url} failed"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("VAD model download returned HTTP {}", status);
    }
    let body = response.bytes().await?;

    // Write next to the target first so a partial file is never picked up
    let partial = path.with_extension("onnx.part");
    fs::write(&partial, &body).await?;
    fs::rename(&partial, path).await?;

    let digest = Sha256::digest(&body);
    info!(
        "Saved VAD model to {:?} ({} bytes, sha256 {:x})",
        path,
        body.len(),
        digest
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_nothing_configured() {
        let config = VADConfig {
            model_path: None,
            cache_path: None,
            ..Default::default()
        };
        assert!(model_path(&config).is_err());
    }

    #[test]
    fn test_cached_model_is_found() {
        let dir = tempdir().unwrap();
        let config = VADConfig {
            cache_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        assert!(model_path(&config).is_err());

        let vad_dir = dir.path().join("vad");
        std::fs::create_dir_all(&vad_dir).unwrap();
        std::fs::write(vad_dir.join(MODEL_FILENAME), b"onnx").unwrap();

        assert_eq!(model_path(&config).unwrap(), vad_dir.join(MODEL_FILENAME));
    }

    #[tokio::test]
    async fn test_explicit_path_is_not_downloaded() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("custom.onnx");
        let config = VADConfig {
            model_path: Some(missing.clone()),
            ..Default::default()
        };
        assert!(download_model(&config).await.is_err());

        std::fs::write(&missing, b"model").unwrap();
        assert_eq!(download_model(&config).await.unwrap(), missing);
    }
}
