//! Initialization helpers for preparing runtime assets before starting the
//! bridge.
//!
//! This module hosts the logic behind the `telephony-bridge init` CLI command.
//! The command downloads and caches the Silero VAD model so that regular
//! server startups do not have to fetch it.
//!
//! ```text
//! $ CACHE_PATH=/app/cache telephony-bridge init
//! ```

#[cfg(feature = "silero-vad")]
use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;

#[cfg(feature = "silero-vad")]
use crate::config::BridgeConfig;
#[cfg(feature = "silero-vad")]
use crate::core::vad::assets;

/// Download and prepare all assets required for runtime execution.
#[cfg(feature = "silero-vad")]
pub async fn run() -> Result<()> {
    let config = BridgeConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let cache_path = config
        .cache_path
        .as_ref()
        .context("CACHE_PATH environment variable must be set to run `telephony-bridge init`")?
        .clone();

    let mut vad_config = config.vad.clone();
    vad_config.cache_path = Some(cache_path.clone());

    tracing::info!("Preparing VAD model using cache path: {:?}", cache_path);
    let path = assets::download_model(&vad_config).await?;

    tracing::info!("VAD model ready at {}", path.display());

    Ok(())
}

#[cfg(not(feature = "silero-vad"))]
pub async fn run() -> Result<()> {
    Err(anyhow!(
        "`telephony-bridge init` requires the `silero-vad` feature. \
         Rebuild with `--features silero-vad` to download the VAD model."
    ))
}
