//! Telephony WebSocket handler
//!
//! One connection carries one phone call. The socket is split: a writer task
//! drains [`MessageRoute`]s and is the only thing that writes to the socket,
//! while the reader half is handed to the [`CallSession`] as a stream of
//! [`TelephonyFrame`]s.

use std::sync::Arc;

use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::NoiseSettingsUpdate;
use crate::session::{CallSession, CallType, SessionParams, TelephonyStream};
use crate::state::AppState;
use crate::telephony::{
    CLOSE_TRY_AGAIN_LATER, MessageRoute, TelephonyError, TelephonyFrame,
};

/// Channel buffer between the session and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct TelephonyQuery {
    /// Agent to dispatch instead of the configured one
    pub agent_name: Option<String>,
    /// The agent is already in the room; skip dispatch
    #[serde(default)]
    pub outbound: bool,
    pub noise_enabled: Option<bool>,
    pub noise_type: Option<String>,
    pub noise_volume: Option<f32>,
}

impl TelephonyQuery {
    fn call_type(&self) -> CallType {
        if self.outbound {
            CallType::Outbound
        } else {
            CallType::Inbound
        }
    }

    fn noise_update(&self) -> NoiseSettingsUpdate {
        NoiseSettingsUpdate {
            enabled: self.noise_enabled,
            noise_type: self.noise_type.clone(),
            volume: self.noise_volume,
        }
    }
}

/// `GET /telephony/{room_name}` - upgrade to a telephony media stream
pub async fn telephony_handler(
    ws: WebSocketUpgrade,
    Path(room_name): Path<String>,
    Query(query): Query<TelephonyQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(room = %room_name, ?query, "Telephony WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_telephony_socket(socket, room_name, query, state))
}

async fn handle_telephony_socket(
    socket: WebSocket,
    room_name: String,
    query: TelephonyQuery,
    state: Arc<AppState>,
) {
    let (mut sender, receiver) = socket.split();

    if !state.config.accept_incoming_calls {
        warn!(room = %room_name, "Rejecting call: incoming calls are disabled");
        let frame = close_frame(CLOSE_TRY_AGAIN_LATER, &state.config.reject_message);
        if let Err(e) = sender.send(Message::Close(Some(frame))).await {
            debug!("Failed to send reject close frame: {}", e);
        }
        return;
    }

    let _active = state.track_call();
    let (message_tx, message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let mut writer_task = tokio::spawn(write_routes(sender, message_rx));

    let agent_name = state
        .config
        .resolve_agent_name(query.agent_name.as_deref());
    let mut params = SessionParams::new(room_name.clone(), agent_name, query.call_type());
    params.noise = query.noise_update();

    let session = CallSession::create(
        state.config.clone(),
        params,
        state.session_deps(),
        message_tx,
    )
    .await;
    let summary = session.run(telephony_stream(receiver)).await;

    // The session holds the only sender; once it is gone the writer drains and exits
    if tokio::time::timeout(state.config.timeouts.websocket_close, &mut writer_task)
        .await
        .is_err()
    {
        debug!(room = %room_name, "Socket writer did not finish, aborting");
        writer_task.abort();
    }

    info!(
        room = %room_name,
        reason = ?summary.termination_reason,
        "Telephony connection finished"
    );
}

/// Drain session output into the socket until a close is sent or the
/// channel closes
async fn write_routes(
    mut sender: SplitSink<WebSocket, Message>,
    mut message_rx: mpsc::Receiver<MessageRoute>,
) {
    while let Some(route) = message_rx.recv().await {
        let should_close = matches!(route, MessageRoute::Close { .. });

        let result = match route {
            MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            },
            MessageRoute::Close { code, reason } => {
                info!("Closing telephony WebSocket: {}", reason);
                sender
                    .send(Message::Close(Some(close_frame(code, &reason))))
                    .await
            }
        };

        if let Err(e) = result {
            // The session notices through its own send failures
            debug!("Failed to send WebSocket message: {}", e);
            break;
        }

        if should_close {
            break;
        }
    }
}

/// Reader half as a stream of telephony frames; pings and pongs are handled
/// by axum and dropped here.
fn telephony_stream(receiver: SplitStream<WebSocket>) -> TelephonyStream {
    receiver
        .filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(TelephonyFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => Some(Ok(TelephonyFrame::Binary(data))),
                Ok(Message::Close(_)) => Some(Ok(TelephonyFrame::Close)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                Err(e) => Some(Err(TelephonyError::WebSocket(e.to_string()))),
            }
        })
        .boxed()
}

fn close_frame(code: u16, reason: &str) -> CloseFrame {
    CloseFrame {
        code,
        reason: reason.to_owned().into(),
    }
}
