//! Noise asset decoding

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::audio::codec::to_companded;
use crate::core::audio::{AudioError, AudioResult};

/// Budget for the decoder availability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// External decoder used to turn compressed assets into WAV
#[derive(Debug, Clone)]
pub struct NoiseDecoder {
    binary: String,
    timeout: Duration,
}

impl NoiseDecoder {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Check that the decoder binary runs
    pub async fn is_available(&self) -> bool {
        let mut command = Command::new(&self.binary);
        command
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(PROBE_TIMEOUT, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("Decoder probe failed for {}: {}", self.binary, e);
                false
            }
            Err(_) => {
                debug!("Decoder probe timed out for {}", self.binary);
                false
            }
        }
    }

    /// Decode `input` to a mono 16-bit WAV at `sample_rate`, returning the samples
    async fn decode(&self, input: &Path, sample_rate: u32) -> AudioResult<Vec<i16>> {
        let output = std::env::temp_dir().join(format!("noise-{}.wav", uuid::Uuid::new_v4()));

        let result = self.run(input, &output, sample_rate).await;
        let samples = match result {
            Ok(()) => read_wav(&output, sample_rate),
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&output).await {
            debug!("Could not remove decoder output {:?}: {}", output, e);
        }

        samples
    }

    async fn run(&self, input: &Path, output: &Path, sample_rate: u32) -> AudioResult<()> {
        let rate = sample_rate.to_string();
        let mut command = Command::new(&self.binary);
        command
            .arg("-i")
            .arg(input)
            .args(["-ar", rate.as_str(), "-ac", "1", "-f", "wav", "-y"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AudioError::DecoderTimeout(self.timeout.as_secs()))?
            .map_err(|e| AudioError::DecoderUnavailable(format!("{}: {}", self.binary, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(AudioError::DecoderFailed(format!(
                "{} exited with {}: {}",
                self.binary, result.status, tail
            )));
        }

        Ok(())
    }
}

impl Default for NoiseDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", Duration::from_secs(30))
    }
}

/// Decoded noise held as μ-law bytes; immutable after load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseAsset {
    companded: Vec<u8>,
    source: Option<PathBuf>,
}

impl NoiseAsset {
    /// Load an asset, decoding it to mono at `target_rate`.
    ///
    /// WAV files already in the target format are read in-process; anything
    /// else goes through `decoder`.
    pub async fn load(path: &Path, target_rate: u32, decoder: &NoiseDecoder) -> AudioResult<Self> {
        if !path.exists() {
            return Err(AudioError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("noise asset not found: {}", path.display()),
            )));
        }

        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

        let samples = if is_wav {
            match read_wav(path, target_rate) {
                Ok(samples) => samples,
                Err(e) => {
                    debug!("WAV asset needs conversion ({}), using decoder", e);
                    decoder.decode(path, target_rate).await?
                }
            }
        } else {
            decoder.decode(path, target_rate).await?
        };

        if samples.is_empty() {
            return Err(AudioError::UnsupportedFormat(format!(
                "noise asset {} decoded to zero samples",
                path.display()
            )));
        }

        info!(
            "Loaded noise asset {} ({} samples, {:.1}s)",
            path.display(),
            samples.len(),
            samples.len() as f32 / target_rate as f32
        );

        Ok(Self {
            companded: to_companded(&samples),
            source: Some(path.to_path_buf()),
        })
    }

    /// Wrap already-encoded μ-law bytes
    pub fn from_companded(companded: Vec<u8>) -> Self {
        Self {
            companded,
            source: None,
        }
    }

    /// Encode linear samples
    pub fn from_pcm(samples: &[i16]) -> Self {
        Self::from_companded(to_companded(samples))
    }

    pub fn len(&self) -> usize {
        self.companded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companded.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.companded
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn read_wav(path: &Path, expected_rate: u32) -> AudioResult<Vec<i16>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }
    if spec.sample_rate != expected_rate {
        return Err(AudioError::SampleRateMismatch {
            expected: expected_rate,
            actual: spec.sample_rate,
        });
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        warn!(
            "Unexpected WAV sample format {:?}/{} bits",
            spec.sample_format, spec.bits_per_sample
        );
        return Err(AudioError::UnsupportedFormat(format!(
            "expected 16-bit PCM, got {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(samples)
}
