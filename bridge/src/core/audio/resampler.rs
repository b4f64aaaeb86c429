//! Room-rate to telephony-rate conversion
//!
//! Agent audio arrives from the room at 48 kHz in frames of arbitrary length.
//! [`TelephonyConverter`] buffers it, resamples with an FFT resampler in fixed
//! 20 ms input chunks and slices the result into 160-sample telephony frames,
//! each μ-law encoded. One input frame can therefore yield zero, one or several
//! telephony frames; callers must send every frame returned, in order.

use rubato::{FftFixedIn, Resampler};
use tracing::{debug, warn};

use super::codec::{to_companded, to_linear};
use super::{
    AudioError, AudioFrame, AudioResult, ROOM_FRAME_SAMPLES, ROOM_SAMPLE_RATE, SampleRate,
    TELEPHONY_FRAME_BYTES, TELEPHONY_SAMPLE_RATE,
};

/// Errors logged before the converter goes quiet
const MAX_LOGGED_ERRORS: u64 = 5;

/// Converts room audio frames into μ-law telephony frames
pub struct TelephonyConverter {
    resampler: FftFixedIn<f32>,
    /// Normalized room-rate samples waiting for a full resampler chunk
    input_buffer: Vec<f32>,
    /// Telephony-rate samples waiting for a full 160-sample frame
    output_buffer: Vec<i16>,
    frames_in: u64,
    frames_out: u64,
    errors: u64,
}

impl TelephonyConverter {
    pub fn new() -> AudioResult<Self> {
        let resampler = FftFixedIn::<f32>::new(
            ROOM_SAMPLE_RATE as usize,
            TELEPHONY_SAMPLE_RATE as usize,
            ROOM_FRAME_SAMPLES,
            2,
            1,
        )
        .map_err(|e| AudioError::Resample(e.to_string()))?;

        Ok(Self {
            resampler,
            input_buffer: Vec::with_capacity(ROOM_FRAME_SAMPLES * 2),
            output_buffer: Vec::with_capacity(TELEPHONY_FRAME_BYTES * 2),
            frames_in: 0,
            frames_out: 0,
            errors: 0,
        })
    }

    /// Convert one room frame into zero or more μ-law telephony frames.
    ///
    /// Frames at any rate other than 48 kHz are rejected. Resampler failures
    /// drop the buffered audio and return no frames.
    pub fn to_telephony(&mut self, frame: &AudioFrame) -> Vec<Vec<u8>> {
        if frame.sample_rate != SampleRate::Room {
            self.record_error(&AudioError::SampleRateMismatch {
                expected: ROOM_SAMPLE_RATE,
                actual: frame.sample_rate.hz(),
            });
            return Vec::new();
        }

        self.frames_in += 1;
        self.input_buffer
            .extend(frame.samples.iter().map(|&s| s as f32 / 32768.0));

        if let Err(e) = self.drain_input() {
            self.record_error(&e);
            self.input_buffer.clear();
            return Vec::new();
        }

        let mut frames = Vec::new();
        while self.output_buffer.len() >= TELEPHONY_FRAME_BYTES {
            let chunk: Vec<i16> = self.output_buffer.drain(..TELEPHONY_FRAME_BYTES).collect();
            frames.push(to_companded(&chunk));
        }
        self.frames_out += frames.len() as u64;

        frames
    }

    fn drain_input(&mut self) -> AudioResult<()> {
        loop {
            let needed = self.resampler.input_frames_next();
            if self.input_buffer.len() < needed {
                return Ok(());
            }

            let chunk: Vec<f32> = self.input_buffer.drain(..needed).collect();
            let resampled = self
                .resampler
                .process(&[chunk], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;

            if let Some(channel) = resampled.first() {
                self.output_buffer.extend(
                    channel
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16),
                );
            }
        }
    }

    fn record_error(&mut self, error: &AudioError) {
        self.errors += 1;
        if self.errors <= MAX_LOGGED_ERRORS {
            warn!("Dropping agent audio frame: {}", error);
        }
    }

    /// μ-law to linear PCM
    pub fn to_linear(&self, companded: &[u8]) -> Vec<i16> {
        to_linear(companded)
    }

    /// Linear PCM to μ-law
    pub fn to_companded(&self, pcm: &[i16]) -> Vec<u8> {
        to_companded(pcm)
    }

    /// Discard buffered audio and resampler history
    pub fn reset(&mut self) {
        self.input_buffer.clear();
        self.output_buffer.clear();
        self.resampler.reset();
        debug!("Telephony converter reset");
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}
