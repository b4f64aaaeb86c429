//! Telephony message fixtures and a scripted telephony stream

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use telephony_bridge::session::TelephonyStream;
use telephony_bridge::telephony::{TelephonyError, TelephonyFrame};

pub fn start_message(stream_id: &str, call_id: &str) -> String {
    json!({
        "event": "start",
        "start": {
            "streamId": stream_id,
            "callId": call_id,
            "from": "+15550001234",
            "to": "+15550009999"
        }
    })
    .to_string()
}

pub fn media_message(mulaw: &[u8]) -> String {
    json!({
        "event": "media",
        "media": { "payload": STANDARD.encode(mulaw) }
    })
    .to_string()
}

pub fn stop_message() -> String {
    json!({ "event": "stop", "stop": {} }).to_string()
}

/// Test side of a telephony connection
pub struct TelephonyScript {
    tx: mpsc::UnboundedSender<Result<TelephonyFrame, TelephonyError>>,
}

impl TelephonyScript {
    pub fn text(&self, text: String) {
        let _ = self.tx.send(Ok(TelephonyFrame::Text(text)));
    }

    pub fn binary(&self, data: Vec<u8>) {
        let _ = self.tx.send(Ok(TelephonyFrame::Binary(data.into())));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Ok(TelephonyFrame::Close));
    }
}

/// A telephony stream fed by the returned script
pub fn telephony_stream() -> (TelephonyScript, TelephonyStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    })
    .boxed();
    (TelephonyScript { tx }, stream)
}
