//! Base traits and types for media-room providers.
//!
//! The call session never talks to a room SDK directly. It connects through a
//! [`MediaRoom`], receives typed callbacks on a [`RoomEventHandler`] it
//! registers at connect time, and drives the joined room through a
//! [`RoomConnection`] handle.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::audio::{AudioFrame, SampleRate};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to a media room.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Joining the room failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation attempted on a room that is not connected
    #[error("Not connected")]
    NotConnected,

    /// Access token could not be minted
    #[error("Token error: {0}")]
    Token(String),

    /// Track publication failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Audio frame could not be captured into a published track
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Data packet could not be sent
    #[error("Data packet failed: {0}")]
    DataFailed(String),

    /// Agent dispatch request failed
    #[error("Agent dispatch failed: {0}")]
    Dispatch(String),

    /// Missing or invalid provider configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for room operations.
pub type RoomResult<T> = Result<T, RoomError>;

// =============================================================================
// Participants and Tracks
// =============================================================================

/// Remote participant as seen by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub identity: String,
    pub name: String,
    /// Set by the adapter when the SDK reports the participant as an agent
    pub is_agent: bool,
}

impl ParticipantInfo {
    pub fn new(identity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: name.into(),
            is_agent: false,
        }
    }

    pub fn agent(identity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_agent: true,
            ..Self::new(identity, name)
        }
    }

    /// Whether this participant is the agent serving the call.
    ///
    /// Matches the SDK agent flag, an `agent` identity prefix, or the configured
    /// agent name appearing in the identity or display name.
    pub fn is_agent_for(&self, agent_name: &str) -> bool {
        if self.is_agent || self.identity.to_lowercase().starts_with("agent") {
            return true;
        }
        let agent_name = agent_name.trim().to_lowercase();
        !agent_name.is_empty()
            && (self.identity.to_lowercase().contains(&agent_name)
                || self.name.to_lowercase().contains(&agent_name))
    }
}

/// Kind of a published track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Published or subscribed track metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
}

/// Decoded audio frames of a subscribed track
pub type AudioFrameStream = BoxStream<'static, AudioFrame>;

/// A subscribed remote audio track.
///
/// Frames are delivered at the room rate; the stream ends when the track is
/// unsubscribed or the room closes.
pub struct RemoteAudioTrack {
    info: TrackInfo,
    frames: AudioFrameStream,
}

impl RemoteAudioTrack {
    pub fn new(info: TrackInfo, frames: AudioFrameStream) -> Self {
        Self { info, frames }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    /// Consume the track and take its frame stream
    pub fn frames(self) -> AudioFrameStream {
        self.frames
    }
}

impl fmt::Debug for RemoteAudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAudioTrack")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Options used to join a room
#[derive(Debug, Clone)]
pub struct RoomJoinOptions {
    pub room_name: String,
    pub participant_identity: String,
    pub participant_name: String,
}

// =============================================================================
// Traits
// =============================================================================

/// Local audio track published into the room
#[async_trait]
pub trait OutboundAudioTrack: Send + Sync {
    /// Track SID assigned by the server
    fn sid(&self) -> String;

    /// Rate the track was published at
    fn sample_rate(&self) -> SampleRate;

    /// Push one frame of PCM into the track
    async fn capture_frame(&self, frame: &AudioFrame) -> RoomResult<()>;
}

/// Handle to a joined room
#[async_trait]
pub trait RoomConnection: Send + Sync {
    /// Create and publish a mono audio track at `sample_rate`
    async fn publish_audio_track(
        &self,
        name: &str,
        sample_rate: SampleRate,
    ) -> RoomResult<Arc<dyn OutboundAudioTrack>>;

    /// Send a data packet to the other participants
    async fn publish_data(&self, payload: Vec<u8>, topic: &str, reliable: bool) -> RoomResult<()>;

    /// Remote participants currently in the room
    fn remote_participants(&self) -> Vec<ParticipantInfo>;

    fn is_connected(&self) -> bool;

    /// Leave the room
    async fn disconnect(&self) -> RoomResult<()>;
}

/// Typed room callbacks.
///
/// Callbacks are invoked from the adapter's event task and must not block;
/// implementations forward them to their own event loop.
pub trait RoomEventHandler: Send + Sync {
    /// Room joined; `participants` were already present
    fn on_connected(&self, participants: Vec<ParticipantInfo>);

    fn on_disconnected(&self, reason: String);

    fn on_participant_joined(&self, participant: ParticipantInfo);

    fn on_participant_left(&self, participant: ParticipantInfo);

    fn on_track_published(&self, participant: ParticipantInfo, track: TrackInfo);

    fn on_track_subscribed(&self, participant: ParticipantInfo, track: RemoteAudioTrack);

    fn on_track_unsubscribed(&self, participant: ParticipantInfo, track: TrackInfo);
}

/// Factory for room connections
#[async_trait]
pub trait MediaRoom: Send + Sync {
    /// Join a room and register `handler` for its events
    async fn connect(
        &self,
        options: RoomJoinOptions,
        handler: Arc<dyn RoomEventHandler>,
    ) -> RoomResult<Arc<dyn RoomConnection>>;
}

/// Requests that an agent worker join a room
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    /// Dispatch `agent_name` into `room_name`, returning the dispatch id
    async fn dispatch(
        &self,
        room_name: &str,
        agent_name: &str,
        metadata: Option<String>,
    ) -> RoomResult<String>;
}
