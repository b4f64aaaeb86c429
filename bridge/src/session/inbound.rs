//! Caller to room direction: telephony messages in, PCM frames to the room track

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::CallSession;
use super::events::SessionEvent;
use super::state::{SessionCounters, TerminationReason};
use crate::backend::InboundCallRecord;
use crate::config::BridgeConfig;
use crate::core::audio::{AudioFrame, SampleRate, to_companded, to_linear};
use crate::core::{
    InterruptionDetector, InterruptionStats, NoiseSuppressor, SuppressionStatus, VADResult,
    VADStats, VoiceActivityDetector,
};
use crate::telephony::{StartPayload, TelephonyError, TelephonyFrame, TelephonyIncomingMessage};

/// Frames read from the telephony socket
pub type TelephonyStream = BoxStream<'static, Result<TelephonyFrame, TelephonyError>>;

/// Data topic for interruption notices
pub const INTERRUPTION_TOPIC: &str = "interruption";

const MAX_LOGGED_FRAME_ERRORS: u64 = 5;

/// Processing stages applied to every caller frame
pub struct InboundPipeline {
    suppressor: NoiseSuppressor,
    vad: VoiceActivityDetector,
    interruption: InterruptionDetector,
}

/// Caller frame after the pipeline
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub pcm: Vec<i16>,
    pub vad: VADResult,
    pub interrupted: bool,
}

/// Stage statistics handed back when the inbound loop exits
#[derive(Debug, Clone)]
pub struct InboundReport {
    pub vad: VADStats,
    pub suppression: SuppressionStatus,
    pub interruption: InterruptionStats,
}

impl InboundPipeline {
    pub fn new(config: &BridgeConfig, vad: VoiceActivityDetector) -> Self {
        Self {
            suppressor: NoiseSuppressor::new(config.suppression.clone()),
            vad,
            interruption: InterruptionDetector::new(config.interruption.clone()),
        }
    }

    /// μ-law in, PCM for the room out
    pub fn process(&mut self, mulaw: &[u8], agent_speaking: bool, now: Instant) -> ProcessedFrame {
        let pcm = to_linear(mulaw);
        let cleaned = self.suppressor.process(&pcm);
        let vad = self.vad.process_chunk(&cleaned);
        let interrupted = self
            .interruption
            .check_interruption(&vad, agent_speaking, now);

        // The room hears exactly what the caller's line can carry
        let pcm = to_linear(&to_companded(&cleaned));

        ProcessedFrame {
            pcm,
            vad,
            interrupted,
        }
    }

    pub fn signals_agent(&self) -> bool {
        self.interruption.signals_agent()
    }

    pub fn interruption_count(&self) -> u64 {
        self.interruption.interruption_count()
    }

    pub fn report(&self) -> InboundReport {
        InboundReport {
            vad: self.vad.stats(),
            suppression: self.suppressor.status(),
            interruption: self.interruption.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
struct InterruptionNotice {
    #[serde(rename = "type")]
    kind: &'static str,
    count: u64,
    timestamp_ms: u64,
    probability: f32,
}

impl CallSession {
    /// Read the telephony socket until it closes, `stop` arrives, or the
    /// session is cancelled.
    pub(crate) async fn inbound_loop(
        self: Arc<Self>,
        mut stream: TelephonyStream,
        mut pipeline: InboundPipeline,
        token: CancellationToken,
    ) -> InboundReport {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(TelephonyFrame::Text(text))) => {
                    SessionCounters::incr(&self.counters.messages_received);
                    if !self.handle_text(&text, &mut pipeline).await {
                        break;
                    }
                }
                Some(Ok(TelephonyFrame::Binary(bytes))) => {
                    SessionCounters::incr(&self.counters.messages_received);
                    self.handle_media(&bytes, &mut pipeline).await;
                }
                Some(Ok(TelephonyFrame::Close)) | None => {
                    info!(room = %self.room_name, "Telephony WebSocket closed");
                    self.emit(SessionEvent::Terminate(TerminationReason::WebSocketClosed));
                    break;
                }
                Some(Err(e)) => {
                    error!(room = %self.room_name, "Telephony WebSocket error: {}", e);
                    self.emit(SessionEvent::Terminate(TerminationReason::WebSocketClosed));
                    break;
                }
            }
        }

        debug!(room = %self.room_name, "Inbound loop finished");
        pipeline.report()
    }

    /// Returns false when the loop should stop
    async fn handle_text(&self, text: &str, pipeline: &mut InboundPipeline) -> bool {
        match TelephonyIncomingMessage::parse(text) {
            Ok(TelephonyIncomingMessage::Start { start }) => self.handle_start(start),
            Ok(TelephonyIncomingMessage::Media { media }) => match media.decode() {
                Ok(bytes) => self.handle_media(&bytes, pipeline).await,
                Err(e) => self.log_frame_error(&e),
            },
            Ok(TelephonyIncomingMessage::Stop { .. }) => {
                info!(room = %self.room_name, "Call stopped by telephony");
                self.flags.deactivate();
                self.emit(SessionEvent::Terminate(TerminationReason::TelephonyStop));
                return false;
            }
            Ok(TelephonyIncomingMessage::Unknown { event }) => {
                info!(room = %self.room_name, "Unknown telephony event: {}", event);
            }
            Err(e) => {
                warn!(room = %self.room_name, "Ignoring telephony message: {}", e);
            }
        }
        true
    }

    fn handle_start(&self, start: StartPayload) {
        info!(
            room = %self.room_name,
            stream_id = ?start.stream_id,
            call_id = ?start.call_id,
            "Call started: {} -> {}",
            start.from.as_deref().unwrap_or("unknown"),
            start.to.as_deref().unwrap_or("unknown")
        );
        if start.stream_id.is_none() {
            error!(room = %self.room_name, "No stream id in start event; audio cannot be returned");
        }

        self.stream_id.send_replace(start.stream_id.clone());
        *self.call_id.lock() = start.call_id.clone();
        self.flags.mark_started();

        if let (Some(backend), Some(call_id)) = (self.backend.clone(), start.call_id) {
            let record = InboundCallRecord::new(
                call_id,
                start.from,
                start.to,
                self.room_name.clone(),
                self.agent_name.clone(),
            );
            let call_db_id = self.call_db_id.clone();
            tokio::spawn(async move {
                if let Some(id) = backend.record_inbound_call(record).await {
                    *call_db_id.lock() = Some(id);
                }
            });
        }
    }

    async fn handle_media(&self, mulaw: &[u8], pipeline: &mut InboundPipeline) {
        if !self.flags.call_active() || self.flags.is_ending() || mulaw.is_empty() {
            return;
        }
        SessionCounters::add(&self.counters.bytes_from_telephony, mulaw.len() as u64);

        let frame = pipeline.process(mulaw, self.flags.agent_speaking(), Instant::now());
        if frame.interrupted && pipeline.signals_agent() {
            self.signal_interruption(pipeline.interruption_count(), frame.vad.confidence);
        }

        let Some(track) = self.track.get() else {
            let dropped = SessionCounters::incr(&self.counters.dropped_frames);
            if dropped <= MAX_LOGGED_FRAME_ERRORS || dropped % 100 == 0 {
                debug!(room = %self.room_name, "Room track not ready, dropped {} frames", dropped);
            }
            return;
        };

        let audio = AudioFrame::mono(frame.pcm, SampleRate::Telephony);
        match track.capture_frame(&audio).await {
            Ok(()) => {
                let sent = SessionCounters::incr(&self.counters.frames_to_room);
                if sent <= 10 || sent % 500 == 0 {
                    debug!(room = %self.room_name, "Sent {} caller frames to room", sent);
                }
            }
            Err(e) => self.log_frame_error(&e),
        }
    }

    fn signal_interruption(&self, count: u64, probability: f32) {
        let Some(connection) = self.connection.get().cloned() else {
            return;
        };
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let notice = InterruptionNotice {
            kind: "user_interruption",
            count,
            timestamp_ms,
            probability,
        };
        let payload = match serde_json::to_vec(&notice) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode interruption notice: {}", e);
                return;
            }
        };

        let room = self.room_name.clone();
        tokio::spawn(async move {
            if let Err(e) = connection
                .publish_data(payload, INTERRUPTION_TOPIC, true)
                .await
            {
                warn!(room = %room, "Failed to signal interruption to agent: {}", e);
            }
        });
    }

    fn log_frame_error(&self, error: &dyn std::fmt::Display) {
        let errors = SessionCounters::incr(&self.counters.frame_errors);
        if errors <= MAX_LOGGED_FRAME_ERRORS {
            warn!(room = %self.room_name, "Caller frame error: {}", error);
        }
    }
}
