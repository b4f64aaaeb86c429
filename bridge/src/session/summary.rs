//! End-of-call summary

use serde::Serialize;
use tracing::info;

use super::state::{CallType, TerminationReason};
use crate::core::{InterruptionStats, SuppressionStatus, VADStats};

/// Statistics of a finished call, logged at cleanup and returned by `run`
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub room_name: String,
    pub stream_id: Option<String>,
    pub call_id: Option<String>,
    pub call_db_id: Option<String>,
    pub call_type: CallType,
    pub duration_secs: f64,
    pub termination_reason: Option<TerminationReason>,

    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_from_telephony: u64,
    pub bytes_to_telephony: u64,
    pub frames_to_room: u64,
    pub frames_from_agent: u64,
    pub dropped_frames: u64,

    pub agent_found: bool,
    pub agent_identity: Option<String>,

    pub vad: Option<VADStats>,
    pub suppression: Option<SuppressionStatus>,
    pub interruption: Option<InterruptionStats>,
}

impl CallSummary {
    pub fn log(&self) {
        let reason = self
            .termination_reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string());

        info!(
            room = %self.room_name,
            stream_id = ?self.stream_id,
            call_type = %self.call_type,
            "Call summary: {:.1}s, ended by {}",
            self.duration_secs,
            reason
        );
        info!(
            room = %self.room_name,
            "Telephony: {} messages in ({} bytes), {} messages out ({} bytes)",
            self.messages_received,
            self.bytes_from_telephony,
            self.messages_sent,
            self.bytes_to_telephony
        );
        info!(
            room = %self.room_name,
            "Room: {} frames to room, {} dropped, {} agent frames, agent found: {}",
            self.frames_to_room,
            self.dropped_frames,
            self.frames_from_agent,
            self.agent_found
        );
        if let Some(vad) = &self.vad {
            info!(room = %self.room_name, "{}", vad);
        }
        if let Some(suppression) = &self.suppression {
            info!(room = %self.room_name, "{}", suppression);
        }
        if let Some(interruption) = &self.interruption {
            info!(room = %self.room_name, "{}", interruption);
        }
    }
}
