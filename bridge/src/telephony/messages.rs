//! Telephony media-stream message types
//!
//! The vendor sends JSON text frames tagged by `event` (`start`, `media`,
//! `stop`); audio arrives base64 encoded inside `media` events or, once the call
//! is active, as raw binary frames. Audio back to the caller is sent as
//! `playAudio` events.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::audio::TELEPHONY_SAMPLE_RATE;

/// Content type of every `playAudio` payload
pub const MULAW_CONTENT_TYPE: &str = "audio/x-mulaw";

/// Close code for a normally ended call
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the bridge refuses a call
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Errors raised on the telephony leg
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid media payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("No stream id received yet")]
    MissingStreamId,

    #[error("Outbound channel closed")]
    ChannelClosed,

    #[error("Send timed out")]
    SendTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

// =============================================================================
// Transport frames
// =============================================================================

/// A frame read from the telephony WebSocket, independent of the server stack
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

/// What the socket writer should do next
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(TelephonyOutgoingMessage),
    Close { code: u16, reason: String },
}

// =============================================================================
// Incoming Messages (telephony -> bridge)
// =============================================================================

/// Incoming telephony events
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum TelephonyIncomingMessage {
    /// Call media stream started
    #[serde(rename = "start")]
    Start {
        #[serde(default)]
        start: StartPayload,
    },

    /// One chunk of caller audio
    #[serde(rename = "media")]
    Media {
        #[serde(default)]
        media: MediaPayload,
    },

    /// Call ended on the telephony side
    #[serde(rename = "stop")]
    Stop {
        #[serde(default)]
        stop: Value,
    },

    /// Any other event; logged and ignored
    #[serde(skip_deserializing)]
    Unknown { event: String },
}

impl TelephonyIncomingMessage {
    /// Parse a text frame.
    ///
    /// Valid JSON with an unrecognised `event` yields [`Self::Unknown`] instead
    /// of an error.
    pub fn parse(text: &str) -> Result<Self, TelephonyError> {
        let value: Value = serde_json::from_str(text)?;
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match event.as_str() {
            "start" | "media" | "stop" => Ok(serde_json::from_value(value)?),
            _ => Ok(Self::Unknown { event }),
        }
    }

    pub fn event_name(&self) -> &str {
        match self {
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Stop { .. } => "stop",
            Self::Unknown { event } => event,
        }
    }
}

/// Payload of a `start` event
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_id: Option<String>,
    pub call_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub account_id: Option<String>,
}

/// Payload of a `media` event
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MediaPayload {
    pub payload: Option<String>,
}

impl MediaPayload {
    /// Decode the base64 μ-law payload; a missing payload is empty audio
    pub fn decode(&self) -> Result<Vec<u8>, TelephonyError> {
        match &self.payload {
            Some(payload) => Ok(BASE64.decode(payload)?),
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// Outgoing Messages (bridge -> telephony)
// =============================================================================

/// Outgoing telephony events
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event")]
pub enum TelephonyOutgoingMessage {
    /// Play audio to the caller
    #[serde(rename = "playAudio")]
    PlayAudio { media: PlayAudioMedia },
}

impl TelephonyOutgoingMessage {
    /// `playAudio` for a block of 8 kHz μ-law
    pub fn play_audio(mulaw: &[u8]) -> Self {
        Self::PlayAudio {
            media: PlayAudioMedia {
                content_type: MULAW_CONTENT_TYPE.to_string(),
                sample_rate: TELEPHONY_SAMPLE_RATE,
                payload: BASE64.encode(mulaw),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayAudioMedia {
    pub content_type: String,
    pub sample_rate: u32,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_message_deserialization() {
        let json = r#"{
            "event": "start",
            "start": {
                "streamId": "abc",
                "callId": "call-1",
                "from": "+15550001234",
                "to": "+15550009999",
                "accountId": "acct"
            }
        }"#;

        match TelephonyIncomingMessage::parse(json).expect("Should parse") {
            TelephonyIncomingMessage::Start { start } => {
                assert_eq!(start.stream_id.as_deref(), Some("abc"));
                assert_eq!(start.call_id.as_deref(), Some("call-1"));
                assert_eq!(start.from.as_deref(), Some("+15550001234"));
                assert_eq!(start.account_id.as_deref(), Some("acct"));
            }
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_start_without_payload() {
        let msg = TelephonyIncomingMessage::parse(r#"{"event":"start"}"#).unwrap();
        match msg {
            TelephonyIncomingMessage::Start { start } => assert!(start.stream_id.is_none()),
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_media_message_decodes_payload() {
        let payload = BASE64.encode([0xFFu8; 160]);
        let json = format!(r#"{{"event":"media","media":{{"payload":"{payload}"}}}}"#);

        match TelephonyIncomingMessage::parse(&json).unwrap() {
            TelephonyIncomingMessage::Media { media } => {
                assert_eq!(media.decode().unwrap(), vec![0xFF; 160]);
            }
            other => panic!("Expected Media, got {other:?}"),
        }
    }

    #[test]
    fn test_media_invalid_base64() {
        let media = MediaPayload {
            payload: Some("not base64!!".to_string()),
        };
        assert!(matches!(media.decode(), Err(TelephonyError::InvalidPayload(_))));
    }

    #[test]
    fn test_stop_message() {
        let msg = TelephonyIncomingMessage::parse(r#"{"event":"stop","stop":{"reason":"hangup"}}"#)
            .unwrap();
        assert_eq!(msg.event_name(), "stop");
    }

    #[test]
    fn test_unknown_event() {
        let msg = TelephonyIncomingMessage::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#)
            .unwrap();
        match msg {
            TelephonyIncomingMessage::Unknown { event } => assert_eq!(event, "dtmf"),
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TelephonyIncomingMessage::parse("{not json"),
            Err(TelephonyError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_play_audio_serialization() {
        let msg = TelephonyOutgoingMessage::play_audio(&[0xFF, 0x7F]);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["event"], "playAudio");
        assert_eq!(json["media"]["contentType"], "audio/x-mulaw");
        assert_eq!(json["media"]["sampleRate"], 8000);
        assert_eq!(json["media"]["payload"], BASE64.encode([0xFF, 0x7F]));
    }
}
