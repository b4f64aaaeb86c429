//! Room to caller direction: agent audio or background noise to `playAudio`
//!
//! At most one producer runs at a time. It owns the session's
//! [`TelephonyAudioOut`] and returns it from its task when it stops, so the
//! next producer can only start after the previous one has let go.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::CallSession;
use super::events::SessionEvent;
use super::state::{SessionCounters, TerminationReason};
use crate::core::TelephonyConverter;
use crate::core::audio::{FRAME_DURATION_MS, TELEPHONY_FRAME_BYTES, mix, to_linear};
use crate::room::{AudioFrameStream, RemoteAudioTrack};
use crate::telephony::{MAX_CONSECUTIVE_FAILURES, TelephonyAudioOut};

/// RMS (16-bit scale) above which an agent chunk counts as speech
const AGENT_SPEECH_RMS: f32 = 300.0;

/// Quiet chunks before the agent is considered silent (200ms)
const AGENT_SILENCE_CHUNKS: u32 = 10;

/// Who currently holds the outbound writer
pub(crate) enum Producer {
    Idle(TelephonyAudioOut),
    Background {
        handle: JoinHandle<TelephonyAudioOut>,
        token: CancellationToken,
    },
    Agent {
        handle: JoinHandle<TelephonyAudioOut>,
        token: CancellationToken,
        identity: String,
        generation: u64,
    },
    /// Writer lost to an aborted task; nothing can be sent any more
    Lost,
}

impl Producer {
    fn name(&self) -> &'static str {
        match self {
            Producer::Idle(_) => "idle",
            Producer::Background { .. } => "background",
            Producer::Agent { .. } => "agent",
            Producer::Lost => "lost",
        }
    }
}

/// Energy gate with hangover deciding whether the agent is talking
#[derive(Debug, Default)]
struct SpeakingGate {
    speaking: bool,
    quiet_chunks: u32,
}

impl SpeakingGate {
    fn update(&mut self, mulaw: &[u8]) -> bool {
        let pcm = to_linear(mulaw);
        let rms = if pcm.is_empty() {
            0.0
        } else {
            let mean_square =
                pcm.iter().map(|&s| (s as f32) * (s as f32)).sum::<f32>() / pcm.len() as f32;
            mean_square.sqrt()
        };

        if rms > AGENT_SPEECH_RMS {
            self.speaking = true;
            self.quiet_chunks = 0;
        } else {
            self.quiet_chunks += 1;
            if self.quiet_chunks >= AGENT_SILENCE_CHUNKS {
                self.speaking = false;
            }
        }
        self.speaking
    }
}

impl CallSession {
    /// Stop whatever producer runs and get the writer back.
    ///
    /// The task is cancelled and joined for at most `join`; a task that does
    /// not finish in time is aborted and the writer is lost.
    async fn reclaim(&self, producer: Producer, join: Duration) -> Option<TelephonyAudioOut> {
        let (mut handle, token) = match producer {
            Producer::Idle(out) => return Some(out),
            Producer::Lost => return None,
            Producer::Background { handle, token } => (handle, token),
            Producer::Agent { handle, token, .. } => (handle, token),
        };

        token.cancel();
        match tokio::time::timeout(join, &mut handle).await {
            Ok(Ok(out)) => Some(out),
            Ok(Err(e)) => {
                error!(room = %self.room_name, "Audio producer task failed: {}", e);
                None
            }
            Err(_) => {
                warn!(room = %self.room_name, "Audio producer did not stop in time, aborting");
                handle.abort();
                None
            }
        }
    }

    /// Stop the running producer, leaving the writer idle
    pub(crate) async fn stop_producer(&self, join: Duration) {
        let mut producer = self.producer.lock().await;
        let current = mem::replace(&mut *producer, Producer::Lost);
        let name = current.name();
        *producer = match self.reclaim(current, join).await {
            Some(out) => Producer::Idle(out),
            None => Producer::Lost,
        };
        debug!(room = %self.room_name, "Stopped {} audio producer", name);
    }

    /// Stop the agent stream only; the background loop keeps running
    pub(crate) async fn stop_agent_stream(&self, join: Duration) {
        let mut producer = self.producer.lock().await;
        if !matches!(*producer, Producer::Agent { .. }) {
            return;
        }
        let current = mem::replace(&mut *producer, Producer::Lost);
        *producer = match self.reclaim(current, join).await {
            Some(out) => Producer::Idle(out),
            None => Producer::Lost,
        };
        self.flags.set_agent_speaking(false);
    }

    /// Start the background noise loop unless the agent is streaming
    pub(crate) async fn start_background(self: &Arc<Self>) {
        let mut producer = self.producer.lock().await;
        if matches!(
            *producer,
            Producer::Agent { .. } | Producer::Background { .. }
        ) {
            return;
        }
        if self.flags.is_ending() || !self.noise.is_enabled() {
            return;
        }

        let Producer::Idle(out) = mem::replace(&mut *producer, Producer::Lost) else {
            return;
        };
        let token = self.token.child_token();
        let handle = tokio::spawn(self.clone().background_loop(out, token.clone()));
        *producer = Producer::Background { handle, token };
        info!(room = %self.room_name, "Background audio started");
    }

    /// Stream `track` from agent `identity` to the caller, replacing any
    /// producer that is running.
    pub(crate) async fn start_agent_stream(self: &Arc<Self>, identity: String, track: RemoteAudioTrack) {
        if self.flags.is_ending() {
            return;
        }

        let mut producer = self.producer.lock().await;
        if let Producer::Agent { identity: current, .. } = &*producer {
            info!(room = %self.room_name, "Replacing agent audio stream from {}", current);
        }

        let current = mem::replace(&mut *producer, Producer::Lost);
        let Some(out) = self.reclaim(current, self.config.timeouts.task_join).await else {
            error!(room = %self.room_name, "Outbound audio writer lost, cannot stream agent audio");
            return;
        };

        let generation = self.agent_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.token.child_token();
        info!(
            room = %self.room_name,
            "Streaming agent audio from {} (track {})", identity, track.info().sid
        );
        let handle = tokio::spawn(self.clone().agent_stream_loop(
            out,
            track.frames(),
            generation,
            token.clone(),
        ));
        *producer = Producer::Agent {
            handle,
            token,
            identity,
            generation,
        };
    }

    /// Agent stream `generation` ended by itself; fall back to background audio
    pub(crate) async fn on_agent_stream_ended(self: &Arc<Self>, generation: u64) {
        {
            let mut producer = self.producer.lock().await;
            let is_current = matches!(
                &*producer,
                Producer::Agent { generation: g, .. } if *g == generation
            );
            if !is_current {
                return;
            }
            let current = mem::replace(&mut *producer, Producer::Lost);
            *producer = match self.reclaim(current, self.config.timeouts.task_join).await {
                Some(out) => Producer::Idle(out),
                None => Producer::Lost,
            };
        }
        info!(room = %self.room_name, "Agent audio stream ended");
        self.start_background().await;
    }

    async fn agent_stream_loop(
        self: Arc<Self>,
        mut out: TelephonyAudioOut,
        mut frames: AudioFrameStream,
        generation: u64,
        token: CancellationToken,
    ) -> TelephonyAudioOut {
        let mut converter = match TelephonyConverter::new() {
            Ok(converter) => converter,
            Err(e) => {
                error!(room = %self.room_name, "Cannot convert agent audio: {}", e);
                return out;
            }
        };
        let mut gate = SpeakingGate::default();
        let mut ended_naturally = false;

        'stream: loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                frame = frames.next() => frame,
            };
            let Some(frame) = frame else {
                ended_naturally = true;
                break;
            };

            for chunk in converter.to_telephony(&frame) {
                if token.is_cancelled() || self.flags.is_ending() {
                    break 'stream;
                }
                self.flags.set_agent_speaking(gate.update(&chunk));

                let outgoing = match self.noise.next_chunk_raw(chunk.len()) {
                    Some(noise) => mix(&chunk, &noise, 1.0, self.noise.volume()),
                    None => chunk,
                };

                match out.send_audio(&outgoing).await {
                    Ok(()) => {
                        let sent = SessionCounters::incr(&self.counters.frames_from_agent);
                        if sent <= 10 || sent % 500 == 0 {
                            debug!(room = %self.room_name, "Sent {} agent frames to caller", sent);
                        }
                    }
                    Err(_) if out.is_failing() => {
                        error!(
                            room = %self.room_name,
                            "Agent audio: {} consecutive send failures, giving up",
                            MAX_CONSECUTIVE_FAILURES
                        );
                        self.emit(SessionEvent::Terminate(TerminationReason::SendFailures));
                        break 'stream;
                    }
                    Err(_) => {}
                }
            }
        }

        self.flags.set_agent_speaking(false);
        if ended_naturally && !self.flags.is_ending() {
            self.emit(SessionEvent::AgentStreamEnded(generation));
        }
        out
    }

    async fn background_loop(
        self: Arc<Self>,
        mut out: TelephonyAudioOut,
        token: CancellationToken,
    ) -> TelephonyAudioOut {
        let mut ticker = interval(Duration::from_millis(FRAME_DURATION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut misses = 0u32;

        self.noise.start();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.flags.is_ending() {
                break;
            }
            if !out.is_ready() {
                continue;
            }

            let Some(chunk) = self.noise.next_chunk(TELEPHONY_FRAME_BYTES) else {
                misses += 1;
                if misses >= MAX_CONSECUTIVE_FAILURES {
                    warn!(room = %self.room_name, "Background noise unavailable, stopping loop");
                    break;
                }
                continue;
            };
            misses = 0;

            if token.is_cancelled() || self.flags.is_ending() {
                break;
            }
            if out.send_audio(&chunk).await.is_err() && out.is_failing() {
                error!(
                    room = %self.room_name,
                    "Background audio: {} consecutive send failures, giving up",
                    MAX_CONSECUTIVE_FAILURES
                );
                self.emit(SessionEvent::Terminate(TerminationReason::SendFailures));
                break;
            }
        }

        debug!(room = %self.room_name, "Background loop finished");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::to_companded;

    #[test]
    fn test_speaking_gate_hangover() {
        let mut gate = SpeakingGate::default();
        let loud = to_companded(&[8000i16; 160]);
        let quiet = to_companded(&[0i16; 160]);

        assert!(!gate.update(&quiet));
        assert!(gate.update(&loud));

        for _ in 0..AGENT_SILENCE_CHUNKS - 1 {
            assert!(gate.update(&quiet));
        }
        assert!(!gate.update(&quiet));
    }

    #[test]
    fn test_speaking_gate_resets_on_speech() {
        let mut gate = SpeakingGate::default();
        let loud = to_companded(&[8000i16; 160]);
        let quiet = to_companded(&[0i16; 160]);

        gate.update(&loud);
        for _ in 0..5 {
            gate.update(&quiet);
        }
        gate.update(&loud);
        for _ in 0..AGENT_SILENCE_CHUNKS - 1 {
            assert!(gate.update(&quiet));
        }
    }
}
