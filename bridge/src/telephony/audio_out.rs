//! Single writer of outbound telephony audio
//!
//! Exactly one [`TelephonyAudioOut`] exists per call. It is moved into whichever
//! producer currently feeds the caller (the background noise loop or the agent
//! stream) and handed back when that producer exits, so two producers can never
//! interleave `playAudio` messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::warn;

use super::messages::{MessageRoute, TelephonyError, TelephonyOutgoingMessage};

/// Consecutive failed sends after which a producer gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 50;

const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Counters shared with the session summary
#[derive(Debug, Default)]
pub struct OutboundCounters {
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl OutboundCounters {
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

pub struct TelephonyAudioOut {
    tx: mpsc::Sender<MessageRoute>,
    stream_id: watch::Receiver<Option<String>>,
    counters: Arc<OutboundCounters>,
    consecutive_failures: u32,
}

impl TelephonyAudioOut {
    pub fn new(
        tx: mpsc::Sender<MessageRoute>,
        stream_id: watch::Receiver<Option<String>>,
        counters: Arc<OutboundCounters>,
    ) -> Self {
        Self {
            tx,
            stream_id,
            counters,
            consecutive_failures: 0,
        }
    }

    /// Whether the telephony side has announced its stream
    pub fn is_ready(&self) -> bool {
        self.stream_id.borrow().is_some()
    }

    /// Failure streak has reached [`MAX_CONSECUTIVE_FAILURES`]
    pub fn is_failing(&self) -> bool {
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Send one block of μ-law as a `playAudio` event
    pub async fn send_audio(&mut self, mulaw: &[u8]) -> Result<(), TelephonyError> {
        let result = self.try_send(mulaw).await;
        match &result {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_sent
                    .fetch_add(mulaw.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures <= 5 || self.consecutive_failures % 50 == 0 {
                    warn!(
                        "Failed to send audio to telephony ({} in a row): {}",
                        self.consecutive_failures, e
                    );
                }
            }
        }
        result
    }

    async fn try_send(&self, mulaw: &[u8]) -> Result<(), TelephonyError> {
        if !self.is_ready() {
            return Err(TelephonyError::MissingStreamId);
        }

        let route = MessageRoute::Outgoing(TelephonyOutgoingMessage::play_audio(mulaw));
        match tokio::time::timeout(SEND_TIMEOUT, self.tx.send(route)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TelephonyError::ChannelClosed),
            Err(_) => Err(TelephonyError::SendTimeout),
        }
    }
}
