//! Telephony WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::telephony::telephony_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony media-stream router
///
/// # Endpoint
///
/// `GET /telephony/{room_name}` - WebSocket upgrade, one phone call per connection
///
/// # Query
///
/// - `agent_name` - agent to dispatch instead of the configured one
/// - `outbound=true` - the agent is already in the room, skip dispatch
/// - `noise_enabled`, `noise_type`, `noise_volume` - background noise overrides
///
/// # Protocol
///
/// The telephony provider sends `start`, `media` (base64 μ-law, 8 kHz) and
/// `stop` events. The bridge answers with `playAudio` events carrying the
/// agent's voice over background noise.
///
/// ```json
/// {"event": "start", "start": {"streamId": "abc", "callId": "c1", "from": "+1555", "to": "+1666"}}
/// {"event": "media", "media": {"payload": "//////////8="}}
/// {"event": "playAudio", "media": {"contentType": "audio/x-mulaw", "sampleRate": 8000, "payload": "..."}}
/// ```
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/telephony/{room_name}", get(telephony_handler))
        .layer(TraceLayer::new_for_http())
}
