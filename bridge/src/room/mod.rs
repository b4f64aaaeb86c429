//! Media-room abstraction
//!
//! The session joins a room, publishes the caller's audio, and listens to the
//! agent's audio through the traits in [`base`]. [`livekit`] implements them on
//! top of the LiveKit Rust SDK; [`dispatch`] asks the LiveKit server to send an
//! agent worker into the room.

pub mod base;
pub mod dispatch;
pub mod livekit;

pub use base::{
    AgentDispatcher, AudioFrameStream, MediaRoom, OutboundAudioTrack, ParticipantInfo,
    RemoteAudioTrack, RoomConnection, RoomError, RoomEventHandler, RoomJoinOptions, RoomResult,
    TrackInfo, TrackKind,
};
pub use self::dispatch::LiveKitDispatcher;
pub use self::livekit::{LiveKitRoom, mint_token};
