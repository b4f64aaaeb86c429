//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `telephony` - Telephony media-stream WebSocket

pub mod api;
pub mod telephony;

pub use telephony::telephony_handler;
