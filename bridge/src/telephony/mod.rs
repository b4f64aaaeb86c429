//! Telephony media-stream leg: wire messages and the outbound audio writer.

pub mod audio_out;
pub mod messages;

pub use audio_out::{MAX_CONSECUTIVE_FAILURES, OutboundCounters, TelephonyAudioOut};
pub use messages::{
    CLOSE_NORMAL, CLOSE_TRY_AGAIN_LATER, MessageRoute, StartPayload, TelephonyError,
    TelephonyFrame, TelephonyIncomingMessage, TelephonyOutgoingMessage,
};
