//! Call session orchestrator
//!
//! One [`CallSession`] owns one phone call: it joins the media room, publishes
//! the caller's audio, streams the agent's audio (or background noise) back to
//! the caller and tears everything down exactly once when the call ends.
//!
//! ```text
//! Init -> Connecting -> Active -> Terminating -> Closed
//! ```
//!
//! Tasks started by [`CallSession::run`]:
//! - inbound loop: telephony frames -> suppression / VAD / interruption -> room track
//! - room connect: join, publish the caller track (bounded)
//! - agent dispatch (inbound calls only)
//! - one outbound producer at a time: background noise loop or agent stream
//!
//! Room callbacks and task notifications arrive as [`SessionEvent`]s on a
//! single event loop, which is the only place that triggers termination.

mod events;
mod inbound;
mod outbound;
mod participants;
mod state;
mod summary;

pub use events::{SessionEvent, SessionEventHandler};
pub use inbound::{
    INTERRUPTION_TOPIC, InboundPipeline, InboundReport, ProcessedFrame, TelephonyStream,
};
pub use participants::ParticipantBook;
pub use state::{CallFlags, CallType, SessionCounters, SessionState, TerminationReason};
pub use summary::CallSummary;

use std::sync::atomic::{AtomicU64, Ordering, fence};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use self::outbound::Producer;
use crate::backend::CallRecordClient;
use crate::config::BridgeConfig;
use crate::core::audio::SampleRate;
use crate::core::{NoiseSettingsUpdate, NoiseSource, VoiceActivityDetector, create_vad};
use crate::room::{
    AgentDispatcher, MediaRoom, OutboundAudioTrack, ParticipantInfo, RemoteAudioTrack,
    RoomConnection, RoomJoinOptions, TrackInfo, TrackKind,
};
use crate::telephony::{CLOSE_NORMAL, MessageRoute, OutboundCounters, TelephonyAudioOut};

/// Name of the caller's published track
pub const CALLER_TRACK_NAME: &str = "telephony-audio";

/// Per-call parameters taken from the upgrade request
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub room_name: String,
    /// Resolved agent name for this call
    pub agent_name: String,
    pub call_type: CallType,
    /// Noise overrides for this call only
    pub noise: NoiseSettingsUpdate,
}

impl SessionParams {
    pub fn new(room_name: impl Into<String>, agent_name: impl Into<String>, call_type: CallType) -> Self {
        Self {
            room_name: room_name.into(),
            agent_name: agent_name.into(),
            call_type,
            noise: NoiseSettingsUpdate::default(),
        }
    }
}

/// Shared collaborators a session talks to
#[derive(Clone)]
pub struct SessionDeps {
    pub room: Arc<dyn MediaRoom>,
    pub dispatcher: Option<Arc<dyn AgentDispatcher>>,
    pub backend: Option<CallRecordClient>,
}

pub struct CallSession {
    config: Arc<BridgeConfig>,
    room_name: String,
    agent_name: String,
    participant_identity: String,
    call_type: CallType,

    room: Arc<dyn MediaRoom>,
    dispatcher: Option<Arc<dyn AgentDispatcher>>,
    backend: Option<CallRecordClient>,
    noise: Arc<NoiseSource>,

    tx: mpsc::Sender<MessageRoute>,
    stream_id: watch::Sender<Option<String>>,
    call_id: Mutex<Option<String>>,
    call_db_id: Arc<Mutex<Option<String>>>,

    state: watch::Sender<SessionState>,
    flags: CallFlags,
    counters: SessionCounters,
    outbound_counters: Arc<OutboundCounters>,
    started_at: Instant,

    connection: OnceLock<Arc<dyn RoomConnection>>,
    track: OnceLock<Arc<dyn OutboundAudioTrack>>,
    producer: tokio::sync::Mutex<Producer>,
    agent_generation: AtomicU64,
    pipeline: Mutex<Option<InboundPipeline>>,
    inbound_task: Mutex<Option<JoinHandle<InboundReport>>>,
    participants: Mutex<ParticipantBook>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    token: CancellationToken,
    termination: Mutex<Option<TerminationReason>>,
    summary: OnceLock<CallSummary>,
}

impl CallSession {
    /// Build a session, loading its noise asset and VAD classifier.
    ///
    /// `tx` feeds the telephony socket writer.
    pub async fn create(
        config: Arc<BridgeConfig>,
        params: SessionParams,
        deps: SessionDeps,
        tx: mpsc::Sender<MessageRoute>,
    ) -> Arc<Self> {
        let mut noise_config = config.noise.clone();
        if let Some(noise_type) = &params.noise.noise_type {
            noise_config.noise_type = noise_type.clone();
        }
        let noise = NoiseSource::load(noise_config).await;
        noise.update_settings(NoiseSettingsUpdate {
            noise_type: None,
            ..params.noise.clone()
        });

        let vad = create_vad(config.vad.clone()).await;
        Self::with_stages(config, params, deps, tx, Arc::new(noise), vad)
    }

    /// Build a session around already constructed processing stages
    pub fn with_stages(
        config: Arc<BridgeConfig>,
        params: SessionParams,
        deps: SessionDeps,
        tx: mpsc::Sender<MessageRoute>,
        noise: Arc<NoiseSource>,
        vad: VoiceActivityDetector,
    ) -> Arc<Self> {
        let (stream_id, stream_id_rx) = watch::channel(None);
        let (state, _) = watch::channel(SessionState::Init);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let outbound_counters = Arc::new(OutboundCounters::default());
        let out = TelephonyAudioOut::new(tx.clone(), stream_id_rx, outbound_counters.clone());
        let pipeline = InboundPipeline::new(&config, vad);
        let participant_identity = format!("telephony-{}", Uuid::new_v4().simple());

        info!(
            room = %params.room_name,
            "New {} call session for agent '{}'", params.call_type, params.agent_name
        );

        Arc::new(Self {
            room_name: params.room_name,
            agent_name: params.agent_name,
            participant_identity,
            call_type: params.call_type,
            room: deps.room,
            dispatcher: deps.dispatcher,
            backend: deps.backend,
            noise,
            tx,
            stream_id,
            call_id: Mutex::new(None),
            call_db_id: Arc::new(Mutex::new(None)),
            state,
            flags: CallFlags::default(),
            counters: SessionCounters::default(),
            outbound_counters,
            started_at: Instant::now(),
            connection: OnceLock::new(),
            track: OnceLock::new(),
            producer: tokio::sync::Mutex::new(Producer::Idle(out)),
            agent_generation: AtomicU64::new(0),
            pipeline: Mutex::new(Some(pipeline)),
            inbound_task: Mutex::new(None),
            participants: Mutex::new(ParticipantBook::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            token: CancellationToken::new(),
            termination: Mutex::new(None),
            summary: OnceLock::new(),
            config,
        })
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn flags(&self) -> &CallFlags {
        &self.flags
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn stream_id(&self) -> Option<String> {
        self.stream_id.borrow().clone()
    }

    pub fn noise(&self) -> &NoiseSource {
        &self.noise
    }

    /// Summary of a finished call
    pub fn summary(&self) -> Option<&CallSummary> {
        self.summary.get()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_if_modified(|current| {
            // Closed is final
            if *current == state || *current == SessionState::Closed {
                return false;
            }
            debug!(room = %self.room_name, "Session state {} -> {}", current, state);
            *current = state;
            true
        });
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Drive the call until it ends and return its summary
    pub async fn run(self: Arc<Self>, inbound: TelephonyStream) -> CallSummary {
        let Some(mut events) = self.events_rx.lock().take() else {
            warn!(room = %self.room_name, "Session already running");
            return self.wait_closed().await;
        };
        let Some(pipeline) = self.pipeline.lock().take() else {
            return self.wait_closed().await;
        };

        self.set_state(SessionState::Connecting);

        self.start_background().await;

        let inbound_task = tokio::spawn(self.clone().inbound_loop(
            inbound,
            pipeline,
            self.token.child_token(),
        ));
        *self.inbound_task.lock() = Some(inbound_task);

        tokio::spawn(self.clone().connect_room());

        if self.call_type.needs_dispatch() {
            tokio::spawn(self.clone().dispatch_agent());
        } else {
            info!(room = %self.room_name, "Outbound call, waiting for the existing agent");
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else { break };
            self.handle_event(event).await;
            if self.flags.cleanup_started() {
                break;
            }
        }

        self.cleanup().await;
        self.wait_closed().await
    }

    async fn wait_closed(&self) -> CallSummary {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
        match self.summary.get() {
            Some(summary) => summary.clone(),
            None => self.build_summary(None),
        }
    }

    async fn connect_room(self: Arc<Self>) {
        let timeout = self.config.timeouts.room_connect;
        let options = RoomJoinOptions {
            room_name: self.room_name.clone(),
            participant_identity: self.participant_identity.clone(),
            participant_name: self.config.livekit.participant_name.clone(),
        };
        let handler = Arc::new(SessionEventHandler::new(self.events_tx.clone()));

        let result = tokio::time::timeout(timeout, async {
            let connection = self.room.connect(options, handler).await?;
            let track = connection
                .publish_audio_track(CALLER_TRACK_NAME, SampleRate::Telephony)
                .await;
            Ok::<_, crate::room::RoomError>((connection, track))
        })
        .await;

        match result {
            Ok(Ok((connection, track))) => {
                let _ = self.connection.set(connection.clone());
                fence(Ordering::SeqCst);
                if self.flags.cleanup_started() {
                    // Cleanup ran while we were connecting
                    let _ = connection.disconnect().await;
                    return;
                }
                match track {
                    Ok(track) => {
                        info!(
                            room = %self.room_name,
                            "Caller audio track published: {}", track.sid()
                        );
                        let _ = self.track.set(track);
                        self.emit(SessionEvent::RoomReady);
                    }
                    Err(e) => self.emit(SessionEvent::RoomFailed(e.to_string())),
                }
            }
            Ok(Err(e)) => self.emit(SessionEvent::RoomFailed(e.to_string())),
            Err(_) => self.emit(SessionEvent::RoomFailed(format!(
                "connection timed out after {}s",
                timeout.as_secs_f32()
            ))),
        }
    }

    /// Request the agent and log how the request went. Runs beside the event
    /// loop; the agent joining is observed through participant events.
    async fn dispatch_agent(self: Arc<Self>) {
        let Some(dispatcher) = self.dispatcher.clone() else {
            info!(room = %self.room_name, "No agent dispatcher configured, waiting for an agent to join");
            return;
        };

        let room = self.room_name.clone();
        let agent = self.agent_name.clone();
        let mut task = tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&room, &agent, None).await {
                error!(room = %room, "Agent dispatch failed: {}", e);
            }
        });

        let wait = self.config.timeouts.dispatch_wait;
        tokio::select! {
            _ = self.token.cancelled() => {
                debug!(room = %self.room_name, "Call ended before agent dispatch confirmed");
            }
            result = tokio::time::timeout(wait, &mut task) => match result {
                Ok(_) => info!(room = %self.room_name, "Agent dispatch completed"),
                Err(_) => warn!(
                    room = %self.room_name,
                    "Agent dispatch still running after {}s", wait.as_secs_f32()
                ),
            },
        }
    }

    async fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::RoomConnected(participants) => {
                info!(
                    room = %self.room_name,
                    "Joined room with {} participants", participants.len()
                );
                for participant in participants {
                    self.on_participant(participant);
                }
            }
            SessionEvent::RoomReady => {
                self.set_state(SessionState::Active);
                info!(room = %self.room_name, "Room ready");
            }
            SessionEvent::RoomFailed(reason) => {
                error!(room = %self.room_name, "Room connection failed: {}", reason);
                self.terminate(TerminationReason::RoomConnectFailed).await;
            }
            SessionEvent::RoomDisconnected(reason) => {
                if self.flags.is_ending() {
                    debug!(room = %self.room_name, "Room disconnected during shutdown");
                } else {
                    warn!(room = %self.room_name, "Room disconnected unexpectedly: {}", reason);
                    self.terminate(TerminationReason::RoomDisconnected).await;
                }
            }
            SessionEvent::ParticipantJoined(participant) => {
                info!(room = %self.room_name, "Participant joined: {}", participant.identity);
                self.on_participant(participant);
            }
            SessionEvent::ParticipantLeft(participant) => {
                self.on_participant_left(participant).await;
            }
            SessionEvent::TrackPublished(participant, track) => {
                debug!(
                    room = %self.room_name,
                    "Track published by {}: {} ({})", participant.identity, track.sid, track.kind
                );
            }
            SessionEvent::TrackSubscribed(participant, track) => {
                self.on_track_subscribed(participant, track).await;
            }
            SessionEvent::TrackUnsubscribed(participant, track) => {
                self.on_track_unsubscribed(participant, track);
            }
            SessionEvent::AgentStreamEnded(generation) => {
                self.on_agent_stream_ended(generation).await;
            }
            SessionEvent::Terminate(reason) => {
                self.terminate(reason).await;
            }
        }
    }

    fn on_participant(&self, participant: ParticipantInfo) {
        let identity = participant.identity.clone();
        if self.participants.lock().join(participant, &self.agent_name) {
            info!(
                room = %self.room_name,
                "Agent '{}' is in the room ({} call)", identity, self.call_type
            );
        }
    }

    async fn on_participant_left(&self, participant: ParticipantInfo) {
        info!(room = %self.room_name, "Participant left: {}", participant.identity);
        let (was_agent, room_empty) = {
            let mut book = self.participants.lock();
            let was_agent = book.is_agent(&participant.identity);
            book.leave(&participant.identity);
            (was_agent, book.is_empty())
        };

        if was_agent {
            warn!(room = %self.room_name, "Agent disconnected, ending call");
            self.terminate(TerminationReason::AgentDisconnected).await;
        } else if room_empty {
            warn!(room = %self.room_name, "All participants left, ending call");
            self.terminate(TerminationReason::RoomEmpty).await;
        }
    }

    async fn on_track_subscribed(self: &Arc<Self>, participant: ParticipantInfo, track: RemoteAudioTrack) {
        let info = track.info().clone();
        info!(
            room = %self.room_name,
            "Track subscribed from {}: {} ({})", participant.identity, info.sid, info.kind
        );
        if info.kind != TrackKind::Audio {
            return;
        }

        let is_agent = {
            let mut book = self.participants.lock();
            if !book.is_agent(&participant.identity) {
                book.join(participant.clone(), &self.agent_name);
            }
            let is_agent = book.is_agent(&participant.identity);
            if is_agent {
                book.add_audio_track(&participant.identity, info);
            }
            is_agent
        };

        if is_agent {
            self.start_agent_stream(participant.identity, track).await;
        } else {
            debug!(
                room = %self.room_name,
                "Ignoring audio from non-agent participant {}", participant.identity
            );
        }
    }

    fn on_track_unsubscribed(&self, participant: ParticipantInfo, track: TrackInfo) {
        let mut book = self.participants.lock();
        book.remove_audio_track(&participant.identity, &track.sid);
        if book.is_agent(&participant.identity) {
            warn!(
                room = %self.room_name,
                "Agent track {} unsubscribed", track.sid
            );
        }
    }

    /// End the call: stop agent audio, close the caller's socket, clean up.
    ///
    /// The first reason wins; later calls return immediately.
    pub async fn terminate(&self, reason: TerminationReason) {
        if !self.flags.end_call() {
            debug!(room = %self.room_name, "Call already ending, ignoring {}", reason);
            return;
        }
        warn!(room = %self.room_name, "Terminating call: {}", reason);
        *self.termination.lock() = Some(reason.clone());
        self.set_state(SessionState::Terminating);

        self.flags.force_stop();
        self.stop_agent_stream(self.config.timeouts.task_join).await;

        let close = MessageRoute::Close {
            code: CLOSE_NORMAL,
            reason: format!("Call ended: {reason}"),
        };
        match tokio::time::timeout(self.config.timeouts.websocket_close, self.tx.send(close)).await
        {
            Ok(Ok(())) => info!(room = %self.room_name, "Telephony WebSocket close requested"),
            Ok(Err(_)) => debug!(room = %self.room_name, "Telephony WebSocket already closed"),
            Err(_) => error!(room = %self.room_name, "Telephony WebSocket close timed out"),
        }

        self.cleanup().await;
    }

    /// Release every resource of the call.
    ///
    /// Runs once no matter how many callers race here; returns true for the
    /// caller that performed the cleanup.
    pub async fn cleanup(&self) -> bool {
        if !self.flags.begin_cleanup() {
            return false;
        }
        fence(Ordering::SeqCst);
        info!(room = %self.room_name, "Cleaning up call session");
        self.flags.end_call();
        self.flags.force_stop();
        self.flags.deactivate();
        self.set_state(SessionState::Terminating);
        self.token.cancel();

        let timeouts = &self.config.timeouts;
        self.stop_agent_stream(timeouts.task_join).await;

        if let Some(connection) = self.connection.get() {
            match tokio::time::timeout(timeouts.cleanup, connection.disconnect()).await {
                Ok(Ok(())) => info!(room = %self.room_name, "Left room"),
                Ok(Err(e)) => warn!(room = %self.room_name, "Room disconnect failed: {}", e),
                Err(_) => warn!(room = %self.room_name, "Room disconnect timed out"),
            }
        }

        self.stop_producer(timeouts.cleanup).await;
        self.noise.stop();

        let inbound_task = self.inbound_task.lock().take();
        let report = match inbound_task {
            Some(mut task) => match tokio::time::timeout(timeouts.cleanup, &mut task).await {
                Ok(Ok(report)) => Some(report),
                Ok(Err(e)) => {
                    error!(room = %self.room_name, "Inbound task failed: {}", e);
                    None
                }
                Err(_) => {
                    task.abort();
                    None
                }
            },
            None => None,
        };

        let summary = self.build_summary(report);
        summary.log();
        let _ = self.summary.set(summary);
        self.set_state(SessionState::Closed);
        true
    }

    fn build_summary(&self, report: Option<InboundReport>) -> CallSummary {
        let book = self.participants.lock();
        CallSummary {
            room_name: self.room_name.clone(),
            stream_id: self.stream_id(),
            call_id: self.call_id.lock().clone(),
            call_db_id: self.call_db_id.lock().clone(),
            call_type: self.call_type,
            duration_secs: self.started_at.elapsed().as_secs_f64(),
            termination_reason: self.termination.lock().clone(),
            messages_received: SessionCounters::get(&self.counters.messages_received),
            messages_sent: self.outbound_counters.messages_sent(),
            bytes_from_telephony: SessionCounters::get(&self.counters.bytes_from_telephony),
            bytes_to_telephony: self.outbound_counters.bytes_sent(),
            frames_to_room: SessionCounters::get(&self.counters.frames_to_room),
            frames_from_agent: SessionCounters::get(&self.counters.frames_from_agent),
            dropped_frames: SessionCounters::get(&self.counters.dropped_frames),
            agent_found: book.agent_found(),
            agent_identity: book.agent_identity().map(str::to_string),
            vad: report.as_ref().map(|r| r.vad.clone()),
            suppression: report.as_ref().map(|r| r.suppression.clone()),
            interruption: report.map(|r| r.interruption),
        }
    }
}
