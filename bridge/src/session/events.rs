//! Room callbacks forwarded into the session's event loop

use tokio::sync::mpsc;

use super::state::TerminationReason;
use crate::room::{ParticipantInfo, RemoteAudioTrack, RoomEventHandler, TrackInfo};

/// Everything the session event loop reacts to
#[derive(Debug)]
pub enum SessionEvent {
    RoomConnected(Vec<ParticipantInfo>),
    RoomDisconnected(String),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(ParticipantInfo),
    TrackPublished(ParticipantInfo, TrackInfo),
    TrackSubscribed(ParticipantInfo, RemoteAudioTrack),
    TrackUnsubscribed(ParticipantInfo, TrackInfo),
    /// Room joined and the caller's track is published
    RoomReady,
    RoomFailed(String),
    /// Agent audio stream `generation` ran out of frames
    AgentStreamEnded(u64),
    Terminate(TerminationReason),
}

/// [`RoomEventHandler`] that queues every callback as a [`SessionEvent`]
pub struct SessionEventHandler {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEventHandler {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver is gone once the session has shut down
        let _ = self.tx.send(event);
    }
}

impl RoomEventHandler for SessionEventHandler {
    fn on_connected(&self, participants: Vec<ParticipantInfo>) {
        self.forward(SessionEvent::RoomConnected(participants));
    }

    fn on_disconnected(&self, reason: String) {
        self.forward(SessionEvent::RoomDisconnected(reason));
    }

    fn on_participant_joined(&self, participant: ParticipantInfo) {
        self.forward(SessionEvent::ParticipantJoined(participant));
    }

    fn on_participant_left(&self, participant: ParticipantInfo) {
        self.forward(SessionEvent::ParticipantLeft(participant));
    }

    fn on_track_published(&self, participant: ParticipantInfo, track: TrackInfo) {
        self.forward(SessionEvent::TrackPublished(participant, track));
    }

    fn on_track_subscribed(&self, participant: ParticipantInfo, track: RemoteAudioTrack) {
        self.forward(SessionEvent::TrackSubscribed(participant, track));
    }

    fn on_track_unsubscribed(&self, participant: ParticipantInfo, track: TrackInfo) {
        self.forward(SessionEvent::TrackUnsubscribed(participant, track));
    }
}
