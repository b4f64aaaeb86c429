//! Call session integration tests
//!
//! Drive a full [`CallSession`] against the in-memory room and a scripted
//! telephony stream.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use fixtures::*;
use telephony_bridge::config::BridgeConfig;
use telephony_bridge::core::vad::{EnergyClassifier, VADConfig, VoiceActivityDetector};
use telephony_bridge::core::NoiseSource;
use telephony_bridge::core::noise::NoiseAsset;
use telephony_bridge::core::audio::SampleRate;
use telephony_bridge::room::{AgentDispatcher, ParticipantInfo};
use telephony_bridge::session::{
    CALLER_TRACK_NAME, CallSession, CallSummary, CallType, INTERRUPTION_TOPIC, SessionDeps,
    SessionParams, SessionState, TerminationReason,
};
use telephony_bridge::telephony::{CLOSE_NORMAL, MessageRoute};

const AGENT_NAME: &str = "Mysyara Agent";
const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.noise.enabled = false;
    config.suppression.enabled = false;
    config.timeouts.room_connect = Duration::from_secs(2);
    config.timeouts.cleanup = Duration::from_secs(1);
    config
}

struct Call {
    session: Arc<CallSession>,
    record: Arc<RoomRecord>,
    script: TelephonyScript,
    routes: mpsc::Receiver<MessageRoute>,
    run: JoinHandle<CallSummary>,
}

impl Call {
    fn start(room: MockRoom, call_type: CallType, dispatcher: Option<Arc<dyn AgentDispatcher>>) -> Self {
        let config = test_config();
        let noise = Arc::new(NoiseSource::new(config.noise.clone()));
        Self::start_with(config, room, call_type, dispatcher, noise)
    }

    fn start_with(
        config: BridgeConfig,
        room: MockRoom,
        call_type: CallType,
        dispatcher: Option<Arc<dyn AgentDispatcher>>,
        noise: Arc<NoiseSource>,
    ) -> Self {
        let record = room.record.clone();
        let (tx, routes) = mpsc::channel(1024);
        let (script, stream) = telephony_stream();

        let vad = VoiceActivityDetector::new(VADConfig::default(), Box::new(EnergyClassifier::new()));
        let session = CallSession::with_stages(
            Arc::new(config),
            SessionParams::new("room-1", AGENT_NAME, call_type),
            SessionDeps {
                room: Arc::new(room),
                dispatcher,
                backend: None,
            },
            tx,
            noise,
            vad,
        );
        let run = tokio::spawn(session.clone().run(stream));

        Self {
            session,
            record,
            script,
            routes,
            run,
        }
    }

    async fn wait_for_state(&self, state: SessionState) {
        let mut rx = self.session.subscribe_state();
        timeout(WAIT, rx.wait_for(|s| *s == state))
            .await
            .expect("state change timed out")
            .expect("state channel closed");
    }

    async fn start_stream(&self) {
        self.script.text(start_message("abc", "call-1"));
        timeout(WAIT, async {
            while self.session.stream_id().is_none() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("start event not processed");
    }

    async fn finish(self) -> (CallSummary, Vec<MessageRoute>) {
        let summary = timeout(WAIT, self.run)
            .await
            .expect("session did not finish")
            .expect("session task panicked");
        let mut routes = self.routes;
        let mut seen = Vec::new();
        while let Ok(route) = routes.try_recv() {
            seen.push(route);
        }
        (summary, seen)
    }
}

fn close_code(routes: &[MessageRoute]) -> Option<u16> {
    routes.iter().find_map(|route| match route {
        MessageRoute::Close { code, .. } => Some(*code),
        _ => None,
    })
}

#[tokio::test]
async fn test_full_call_flow() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    call.start_stream().await;
    for _ in 0..10 {
        call.script.text(media_message(&telephony_tone_frame()));
    }
    call.script.text(stop_message());

    let record = call.record.clone();
    let (summary, routes) = call.finish().await;

    assert_eq!(summary.termination_reason, Some(TerminationReason::TelephonyStop));
    assert_eq!(summary.messages_received, 12);
    assert_eq!(summary.frames_to_room, 10);
    assert_eq!(summary.stream_id.as_deref(), Some("abc"));
    assert_eq!(summary.call_id.as_deref(), Some("call-1"));
    assert_eq!(record.captured_frames(), 10);
    assert_eq!(record.disconnects(), 1);
    assert_eq!(close_code(&routes), Some(CLOSE_NORMAL));

    let published = record.published.lock().clone();
    assert_eq!(published, vec![(CALLER_TRACK_NAME.to_string(), SampleRate::Telephony)]);
    for frame in record.captured.lock().iter() {
        assert_eq!(frame.sample_rate, SampleRate::Telephony);
        assert_eq!(frame.samples.len(), 160);
    }
}

#[tokio::test]
async fn test_binary_media_is_forwarded() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    call.start_stream().await;
    call.script.binary(telephony_tone_frame());
    call.script.binary(telephony_silence_frame());
    call.script.close();

    let record = call.record.clone();
    let (summary, _) = call.finish().await;

    assert_eq!(summary.termination_reason, Some(TerminationReason::WebSocketClosed));
    assert_eq!(record.captured_frames(), 2);
}

#[tokio::test]
async fn test_media_before_start_is_ignored() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    call.script.text(media_message(&telephony_tone_frame()));
    call.script.text(stop_message());

    let record = call.record.clone();
    let (summary, _) = call.finish().await;

    assert_eq!(summary.messages_received, 2);
    assert_eq!(record.captured_frames(), 0);
}

#[tokio::test]
async fn test_cleanup_runs_once() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    let (first, second) = tokio::join!(call.session.cleanup(), call.session.cleanup());
    assert!(first ^ second);
    assert_eq!(call.session.state(), SessionState::Closed);

    let record = call.record.clone();
    let (summary, _) = call.finish().await;
    assert_eq!(record.disconnects(), 1);
    assert!(summary.termination_reason.is_none());
}

#[tokio::test]
async fn test_first_termination_reason_wins() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    tokio::join!(
        call.session.terminate(TerminationReason::TelephonyStop),
        call.session.terminate(TerminationReason::RoomDisconnected),
    );

    let (summary, routes) = call.finish().await;
    assert!(summary.termination_reason.is_some());
    let closes = routes
        .iter()
        .filter(|route| matches!(route, MessageRoute::Close { .. }))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_room_connect_failure_ends_call() {
    let call = Call::start(MockRoom::failing(), CallType::Outbound, None);

    let (summary, routes) = call.finish().await;

    assert_eq!(summary.termination_reason, Some(TerminationReason::RoomConnectFailed));
    assert_eq!(close_code(&routes), Some(CLOSE_NORMAL));
}

#[tokio::test]
async fn test_inbound_call_dispatches_agent() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let call = Call::start(MockRoom::new(), CallType::Inbound, Some(dispatcher.clone()));
    call.wait_for_state(SessionState::Active).await;
    timeout(WAIT, async {
        while dispatcher.requests.lock().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatch not requested");
    call.script.close();
    call.finish().await;

    let requests = dispatcher.requests.lock().clone();
    assert_eq!(requests, vec![("room-1".to_string(), AGENT_NAME.to_string())]);
}

#[tokio::test]
async fn test_pending_dispatch_does_not_hold_up_the_call() {
    let mut config = test_config();
    config.timeouts.dispatch_wait = Duration::from_secs(30);
    let noise = Arc::new(NoiseSource::new(config.noise.clone()));
    let dispatcher = Arc::new(StalledDispatcher::default());
    let call = Call::start_with(
        config,
        MockRoom::new(),
        CallType::Inbound,
        Some(dispatcher.clone()),
        noise,
    );

    let mut state = call.session.subscribe_state();
    timeout(Duration::from_secs(1), state.wait_for(|s| *s == SessionState::Active))
        .await
        .expect("room not ready while dispatch pending")
        .unwrap();

    call.start_stream().await;
    call.script.text(stop_message());

    let summary = timeout(Duration::from_secs(1), call.run)
        .await
        .expect("stop not handled while dispatch pending")
        .unwrap();
    assert_eq!(summary.termination_reason, Some(TerminationReason::TelephonyStop));
    assert_eq!(dispatcher.calls(), 1);

    let mut routes = call.routes;
    let mut seen = Vec::new();
    while let Ok(route) = routes.try_recv() {
        seen.push(route);
    }
    assert_eq!(close_code(&seen), Some(CLOSE_NORMAL));
}

#[tokio::test]
async fn test_cleanup_during_room_connect_leaves_room() {
    let (room, gate) = MockRoom::gated();
    let call = Call::start(room, CallType::Outbound, None);

    timeout(WAIT, async {
        while call.record.joins.lock().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("room connect not started");

    assert!(call.session.cleanup().await);
    assert_eq!(call.session.state(), SessionState::Closed);
    assert_eq!(call.record.disconnects(), 0);

    gate.notify_one();
    timeout(WAIT, async {
        while call.record.disconnects() == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("late connection was not disconnected");

    let record = call.record.clone();
    call.finish().await;
    assert_eq!(record.disconnects(), 1);
}

#[tokio::test]
async fn test_outbound_call_skips_dispatch() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let call = Call::start(MockRoom::new(), CallType::Outbound, Some(dispatcher.clone()));
    call.wait_for_state(SessionState::Active).await;
    call.script.close();
    call.finish().await;

    assert!(dispatcher.requests.lock().is_empty());
}

#[tokio::test]
async fn test_agent_leaving_ends_call() {
    let agent = ParticipantInfo::agent("agent-AJ_1", AGENT_NAME);
    let room = MockRoom::with_participants(vec![agent.clone()]);
    let call = Call::start(room, CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    let handler = call.record.handler().expect("session registered a handler");
    handler.on_participant_left(agent);

    let (summary, _) = call.finish().await;
    assert_eq!(summary.termination_reason, Some(TerminationReason::AgentDisconnected));
    assert!(summary.agent_found);
    assert_eq!(summary.agent_identity.as_deref(), Some("agent-AJ_1"));
}

#[tokio::test]
async fn test_last_participant_leaving_ends_call() {
    let guest = ParticipantInfo::new("supervisor", "Supervisor");
    let room = MockRoom::with_participants(vec![guest.clone()]);
    let call = Call::start(room, CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;

    call.record.handler().expect("handler").on_participant_left(guest);

    let (summary, _) = call.finish().await;
    assert_eq!(summary.termination_reason, Some(TerminationReason::RoomEmpty));
}

#[tokio::test]
async fn test_agent_audio_reaches_caller() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;
    call.start_stream().await;

    let agent = ParticipantInfo::agent("agent-AJ_1", AGENT_NAME);
    let (_, track) = agent_track("TR_agent", room_tone_frames(25));
    let handler = call.record.handler().expect("handler");
    handler.on_participant_joined(agent.clone());
    handler.on_track_subscribed(agent, track);

    let mut call = call;
    let route = timeout(WAIT, call.routes.recv())
        .await
        .expect("no agent audio")
        .expect("route channel closed");
    let message = match route {
        MessageRoute::Outgoing(message) => message,
        other => panic!("expected playAudio, got {other:?}"),
    };
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["event"], "playAudio");
    assert_eq!(json["media"]["contentType"], "audio/x-mulaw");
    assert_eq!(json["media"]["sampleRate"], 8000);

    call.script.text(stop_message());
    let (summary, _) = call.finish().await;
    assert!(summary.frames_from_agent > 0);
    assert!(summary.messages_sent > 0);
}

#[tokio::test]
async fn test_caller_speech_over_agent_signals_interruption() {
    let call = Call::start(MockRoom::new(), CallType::Outbound, None);
    call.wait_for_state(SessionState::Active).await;
    call.start_stream().await;

    // Agent keeps its track open after speaking, so the gate stays on
    let agent = ParticipantInfo::agent("agent-AJ_1", AGENT_NAME);
    let frames = futures::StreamExt::chain(
        futures::stream::iter(room_tone_frames(10)),
        futures::stream::pending(),
    );
    let info = telephony_bridge::room::TrackInfo {
        sid: "TR_agent".to_string(),
        name: "agent-voice".to_string(),
        kind: telephony_bridge::room::TrackKind::Audio,
    };
    let track = telephony_bridge::room::RemoteAudioTrack::new(
        info,
        futures::StreamExt::boxed(frames),
    );
    let handler = call.record.handler().expect("handler");
    handler.on_participant_joined(agent.clone());
    handler.on_track_subscribed(agent, track);

    timeout(WAIT, async {
        while !call.session.flags().agent_speaking() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("agent never started speaking");

    for _ in 0..20 {
        call.script.text(media_message(&telephony_tone_frame()));
    }

    let record = call.record.clone();
    timeout(WAIT, async {
        while record.data.lock().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no interruption notice");

    let (payload, topic) = record.data.lock()[0].clone();
    assert_eq!(topic, INTERRUPTION_TOPIC);
    let notice: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(notice["type"], "user_interruption");
    assert_eq!(notice["count"], 1);

    call.script.text(stop_message());
    let (summary, _) = call.finish().await;
    assert_eq!(
        summary.interruption.map(|stats| stats.interruption_count),
        Some(1)
    );
}

#[tokio::test]
async fn test_background_noise_plays_while_waiting_for_agent() {
    let mut config = test_config();
    config.noise.enabled = true;
    let noise = Arc::new(NoiseSource::with_asset(
        config.noise.clone(),
        NoiseAsset::from_pcm(&generate_white_noise(1600, 0.3)),
    ));
    let mut call = Call::start_with(config, MockRoom::new(), CallType::Outbound, None, noise);
    call.wait_for_state(SessionState::Active).await;
    call.start_stream().await;

    let route = timeout(WAIT, call.routes.recv())
        .await
        .expect("no background audio")
        .expect("route channel closed");
    match route {
        MessageRoute::Outgoing(message) => {
            let json = serde_json::to_value(&message).unwrap();
            assert_eq!(json["event"], "playAudio");
        }
        other => panic!("expected playAudio, got {other:?}"),
    }
    assert!(call.session.noise().status().running);

    call.script.text(stop_message());
    let (summary, routes) = call.finish().await;
    assert_eq!(summary.termination_reason, Some(TerminationReason::TelephonyStop));
    assert_eq!(summary.frames_from_agent, 0);
    assert!(summary.messages_sent > 0);
    assert_eq!(close_code(&routes), Some(CLOSE_NORMAL));
}
