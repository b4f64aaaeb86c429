//! Silero ONNX speech classifier

use std::path::Path;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::Value;
use tracing::{debug, info, warn};

use super::assets;
use super::classifier::SpeechClassifier;
use super::config::VADConfig;
use crate::core::audio::{AudioError, AudioResult};

/// Samples of left context fed with each window
const CONTEXT_SIZE_16K: usize = 64;
const CONTEXT_SIZE_8K: usize = 32;

/// Silero VAD running on ONNX Runtime.
///
/// The model keeps an LSTM state tensor `[2, 1, 128]` and expects every window
/// to be prefixed with the tail of the previous one.
pub struct SileroClassifier {
    session: Session,
    state: ndarray::Array3<f32>,
    context: Vec<f32>,
    sample_rate: i64,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl SileroClassifier {
    /// Load the cached model for `config`
    pub async fn load(config: &VADConfig) -> Result<Self> {
        let model_path = assets::model_path(config)?;
        info!("Loading Silero VAD model from: {:?}", model_path);

        let session = tokio::task::spawn_blocking({
            let num_threads = config.num_threads;
            move || create_session(&model_path, num_threads)
        })
        .await
        .context("Failed to spawn blocking task for VAD model loading")??;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        debug!("VAD model inputs {:?}, outputs {:?}", input_names, output_names);

        let context_size = if config.sample_rate == 8000 {
            CONTEXT_SIZE_8K
        } else {
            CONTEXT_SIZE_16K
        };

        Ok(Self {
            session,
            state: ndarray::Array3::<f32>::zeros((2, 1, 128)),
            context: vec![0.0; context_size],
            sample_rate: config.sample_rate as i64,
            input_names,
            output_names,
        })
    }

    fn infer(&mut self, window: &[f32]) -> Result<f32> {
        let context_size = self.context.len();
        let mut input = Vec::with_capacity(context_size + window.len());
        input.extend_from_slice(&self.context);
        input.extend_from_slice(window);
        let total = input.len();

        // Next context is the tail of this window, zero padded on the left if short
        let tail_start = window.len().saturating_sub(context_size);
        let tail = &window[tail_start..];
        self.context.clear();
        self.context.resize(context_size - tail.len(), 0.0);
        self.context.extend_from_slice(tail);

        let (d0, d1, d2) = self.state.dim();
        let mut inputs: Vec<(&str, Value)> = Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let value: Value = match name.as_str() {
                "input" => Value::from_array(([1usize, total], input.clone()))?.into(),
                "state" => {
                    let data: Vec<f32> = self.state.iter().copied().collect();
                    Value::from_array(([d0, d1, d2], data))?.into()
                }
                "sr" => Value::from_array(([1usize], vec![self.sample_rate]))?.into(),
                other => {
                    warn!("Unknown VAD input name: {}", other);
                    continue;
                }
            };
            inputs.push((name.as_str(), value));
        }

        let outputs = self.session.run(inputs)?;

        let prob_name = self.output_names.first().map(String::as_str).unwrap_or("output");
        let (_shape, prob_data) = outputs
            .get(prob_name)
            .context("No probability output from VAD model")?
            .try_extract_tensor::<f32>()
            .context("Failed to extract probability tensor")?;
        let probability = prob_data.first().copied().unwrap_or(0.0);

        let state_name = self.output_names.get(1).map(String::as_str).unwrap_or("stateN");
        if let Some(state_value) = outputs.get(state_name)
            && let Ok((shape, data)) = state_value.try_extract_tensor::<f32>()
            && shape.len() == 3
            && let Ok(next) = ndarray::Array3::from_shape_vec(
                (shape[0] as usize, shape[1] as usize, shape[2] as usize),
                data.to_vec(),
            )
        {
            self.state = next;
        }

        Ok(probability)
    }
}

fn create_session(model_path: &Path, num_threads: Option<usize>) -> Result<Session> {
    let mut builder =
        SessionBuilder::new()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    if let Some(num_threads) = num_threads {
        builder = builder
            .with_intra_threads(num_threads)?
            .with_inter_threads(1)?;
    }

    let session = builder.commit_from_file(model_path)?;
    if session.inputs.len() < 3 {
        warn!(
            "VAD model has {} inputs, expected 3. Model format may differ.",
            session.inputs.len()
        );
    }
    Ok(session)
}

impl SpeechClassifier for SileroClassifier {
    fn probability(&mut self, window: &[f32]) -> AudioResult<f32> {
        self.infer(window)
            .map_err(|e| AudioError::Classifier(e.to_string()))
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
        self.context.fill(0.0);
        debug!("Silero state reset");
    }

    fn name(&self) -> &'static str {
        "silero"
    }
}
