//! In-memory media room that records what the session does to it

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use telephony_bridge::core::audio::{AudioFrame, SampleRate};
use telephony_bridge::room::{
    AgentDispatcher, MediaRoom, OutboundAudioTrack, ParticipantInfo, RemoteAudioTrack,
    RoomConnection, RoomError, RoomEventHandler, RoomJoinOptions, RoomResult, TrackInfo,
    TrackKind,
};

/// Everything the session did to the room
#[derive(Default)]
pub struct RoomRecord {
    pub joins: Mutex<Vec<RoomJoinOptions>>,
    pub published: Mutex<Vec<(String, SampleRate)>>,
    pub captured: Mutex<Vec<AudioFrame>>,
    pub data: Mutex<Vec<(Vec<u8>, String)>>,
    pub disconnects: AtomicUsize,
    handler: Mutex<Option<Arc<dyn RoomEventHandler>>>,
}

impl RoomRecord {
    pub fn captured_frames(&self) -> usize {
        self.captured.lock().len()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Handler the session registered on connect
    pub fn handler(&self) -> Option<Arc<dyn RoomEventHandler>> {
        self.handler.lock().clone()
    }
}

pub struct MockRoom {
    pub record: Arc<RoomRecord>,
    participants: Vec<ParticipantInfo>,
    fail_connect: bool,
    connect_gate: Option<Arc<Notify>>,
}

impl MockRoom {
    pub fn new() -> Self {
        Self {
            record: Arc::new(RoomRecord::default()),
            participants: Vec::new(),
            fail_connect: false,
            connect_gate: None,
        }
    }

    /// Room whose connect blocks until the returned gate is notified
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let room = Self {
            connect_gate: Some(gate.clone()),
            ..Self::new()
        };
        (room, gate)
    }

    /// Room that already holds `participants` when the session joins
    pub fn with_participants(participants: Vec<ParticipantInfo>) -> Self {
        Self {
            participants,
            ..Self::new()
        }
    }

    /// Room whose connect always fails
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl MediaRoom for MockRoom {
    async fn connect(
        &self,
        options: RoomJoinOptions,
        handler: Arc<dyn RoomEventHandler>,
    ) -> RoomResult<Arc<dyn RoomConnection>> {
        if self.fail_connect {
            return Err(RoomError::ConnectionFailed("refused".to_string()));
        }
        self.record.joins.lock().push(options);
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        *self.record.handler.lock() = Some(handler.clone());
        handler.on_connected(self.participants.clone());

        Ok(Arc::new(MockConnection {
            record: self.record.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

pub struct MockConnection {
    record: Arc<RoomRecord>,
    connected: AtomicBool,
}

#[async_trait]
impl RoomConnection for MockConnection {
    async fn publish_audio_track(
        &self,
        name: &str,
        sample_rate: SampleRate,
    ) -> RoomResult<Arc<dyn OutboundAudioTrack>> {
        self.record
            .published
            .lock()
            .push((name.to_string(), sample_rate));
        Ok(Arc::new(MockTrack {
            record: self.record.clone(),
            sample_rate,
        }))
    }

    async fn publish_data(&self, payload: Vec<u8>, topic: &str, _reliable: bool) -> RoomResult<()> {
        self.record.data.lock().push((payload, topic.to_string()));
        Ok(())
    }

    fn remote_participants(&self) -> Vec<ParticipantInfo> {
        Vec::new()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> RoomResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.record.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockTrack {
    record: Arc<RoomRecord>,
    sample_rate: SampleRate,
}

#[async_trait]
impl OutboundAudioTrack for MockTrack {
    fn sid(&self) -> String {
        "TR_caller".to_string()
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    async fn capture_frame(&self, frame: &AudioFrame) -> RoomResult<()> {
        self.record.captured.lock().push(frame.clone());
        Ok(())
    }
}

/// Dispatcher that remembers every request
#[derive(Default)]
pub struct RecordingDispatcher {
    pub requests: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AgentDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        room_name: &str,
        agent_name: &str,
        _metadata: Option<String>,
    ) -> RoomResult<String> {
        self.requests
            .lock()
            .push((room_name.to_string(), agent_name.to_string()));
        Ok("AD_test".to_string())
    }
}

/// Dispatcher whose request never completes
#[derive(Default)]
pub struct StalledDispatcher {
    calls: AtomicUsize,
}

impl StalledDispatcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentDispatcher for StalledDispatcher {
    async fn dispatch(
        &self,
        _room_name: &str,
        _agent_name: &str,
        _metadata: Option<String>,
    ) -> RoomResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }
}

/// Agent audio track that plays `frames` and then ends
pub fn agent_track(sid: &str, frames: Vec<AudioFrame>) -> (TrackInfo, RemoteAudioTrack) {
    let info = TrackInfo {
        sid: sid.to_string(),
        name: "agent-voice".to_string(),
        kind: TrackKind::Audio,
    };
    let stream = futures::stream::iter(frames).boxed();
    (info.clone(), RemoteAudioTrack::new(info, stream))
}
