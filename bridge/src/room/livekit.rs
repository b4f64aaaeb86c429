//! LiveKit room adapter
//!
//! Joins rooms with a server-minted access token, publishes a native audio
//! source for the caller's voice, and turns `RoomEvent`s into
//! [`RoomEventHandler`] callbacks from a dedicated event task.

use async_trait::async_trait;
use futures::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::participant::ParticipantKind;
use livekit::prelude::{
    ConnectionState, DataPacket, LocalAudioTrack, LocalTrack, RemoteParticipant, RemoteTrack,
    RemoteTrackPublication, Room, RoomEvent, RoomOptions, TrackSource,
};
use livekit::track::TrackKind as LiveKitTrackKind;
use livekit::webrtc::audio_frame::AudioFrame as RtcAudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit_api::access_token::{AccessToken, VideoGrants};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::base::{
    MediaRoom, OutboundAudioTrack, ParticipantInfo, RemoteAudioTrack, RoomConnection, RoomError,
    RoomEventHandler, RoomJoinOptions, RoomResult, TrackInfo, TrackKind,
};
use crate::config::LiveKitConfig;
use crate::core::audio::{AudioFrame, SampleRate};

/// Buffered audio in the native source before `capture_frame` waits
const SOURCE_QUEUE_MS: u32 = 1000;

/// Mint a room-join token for one participant
pub fn mint_token(
    api_key: &str,
    api_secret: &str,
    options: &RoomJoinOptions,
) -> RoomResult<String> {
    AccessToken::with_api_key(api_key, api_secret)
        .with_identity(&options.participant_identity)
        .with_name(&options.participant_name)
        .with_grants(VideoGrants {
            room_join: true,
            room: options.room_name.clone(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        })
        .to_jwt()
        .map_err(|e| RoomError::Token(e.to_string()))
}

/// HTTP(S) base URL of the server for the service APIs
pub fn service_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

/// [`MediaRoom`] backed by a LiveKit server
pub struct LiveKitRoom {
    url: String,
    api_key: Zeroizing<String>,
    api_secret: Zeroizing<String>,
}

impl LiveKitRoom {
    pub fn new(config: &LiveKitConfig) -> RoomResult<Self> {
        let (Some(api_key), Some(api_secret)) = (&config.api_key, &config.api_secret) else {
            return Err(RoomError::InvalidConfiguration(
                "LIVEKIT_API_KEY and LIVEKIT_API_SECRET are required".to_string(),
            ));
        };
        if config.url.is_empty() {
            return Err(RoomError::InvalidConfiguration(
                "LIVEKIT_URL is required".to_string(),
            ));
        }

        Ok(Self {
            url: config.url.clone(),
            api_key: Zeroizing::new(api_key.clone()),
            api_secret: Zeroizing::new(api_secret.clone()),
        })
    }
}

#[async_trait]
impl MediaRoom for LiveKitRoom {
    async fn connect(
        &self,
        options: RoomJoinOptions,
        handler: Arc<dyn RoomEventHandler>,
    ) -> RoomResult<Arc<dyn RoomConnection>> {
        let token = mint_token(&self.api_key, &self.api_secret, &options)?;

        info!(room = %options.room_name, "Connecting to LiveKit at {}", self.url);
        let (room, events) = Room::connect(&self.url, &token, RoomOptions::default())
            .await
            .map_err(|e| RoomError::ConnectionFailed(e.to_string()))?;
        let room = Arc::new(room);

        let participants: Vec<ParticipantInfo> = room
            .remote_participants()
            .values()
            .map(participant_info)
            .collect();
        info!(
            room = %options.room_name,
            "Connected to LiveKit room with {} remote participant(s)",
            participants.len()
        );
        handler.on_connected(participants);

        let event_task = tokio::spawn(run_event_loop(events, handler));

        Ok(Arc::new(LiveKitConnection {
            room,
            event_task: Mutex::new(Some(event_task)),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LiveKitConnection {
    room: Arc<Room>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl RoomConnection for LiveKitConnection {
    async fn publish_audio_track(
        &self,
        name: &str,
        sample_rate: SampleRate,
    ) -> RoomResult<Arc<dyn OutboundAudioTrack>> {
        if !self.is_connected() {
            return Err(RoomError::NotConnected);
        }

        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            sample_rate.hz(),
            1,
            SOURCE_QUEUE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(name, RtcAudioSource::Native(source.clone()));

        let publication = self
            .room
            .local_participant()
            .publish_track(
                LocalTrack::Audio(track.clone()),
                TrackPublishOptions {
                    source: TrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| RoomError::PublishFailed(e.to_string()))?;

        let sid = publication.sid().to_string();
        info!("Published audio track '{}' ({}) at {}", name, sid, sample_rate);

        Ok(Arc::new(LiveKitAudioTrack {
            source,
            sid,
            sample_rate,
            _track: track,
        }))
    }

    async fn publish_data(&self, payload: Vec<u8>, topic: &str, reliable: bool) -> RoomResult<()> {
        if !self.is_connected() {
            return Err(RoomError::NotConnected);
        }

        self.room
            .local_participant()
            .publish_data(DataPacket {
                payload,
                topic: Some(topic.to_string()),
                reliable,
                ..Default::default()
            })
            .await
            .map_err(|e| RoomError::DataFailed(e.to_string()))
    }

    fn remote_participants(&self) -> Vec<ParticipantInfo> {
        self.room
            .remote_participants()
            .values()
            .map(participant_info)
            .collect()
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self.room.connection_state() == ConnectionState::Connected
    }

    async fn disconnect(&self) -> RoomResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self
            .room
            .close()
            .await
            .map_err(|e| RoomError::ConnectionFailed(e.to_string()));

        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
        result
    }
}

struct LiveKitAudioTrack {
    source: NativeAudioSource,
    sid: String,
    sample_rate: SampleRate,
    _track: LocalAudioTrack,
}

#[async_trait]
impl OutboundAudioTrack for LiveKitAudioTrack {
    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    async fn capture_frame(&self, frame: &AudioFrame) -> RoomResult<()> {
        if frame.sample_rate != self.sample_rate {
            return Err(RoomError::CaptureFailed(format!(
                "frame at {} pushed into a {} track",
                frame.sample_rate, self.sample_rate
            )));
        }

        let rtc_frame = RtcAudioFrame {
            data: Cow::Borrowed(&frame.samples),
            sample_rate: frame.sample_rate.hz(),
            num_channels: frame.num_channels,
            samples_per_channel: frame.samples_per_channel as u32,
        };

        self.source
            .capture_frame(&rtc_frame)
            .await
            .map_err(|e| RoomError::CaptureFailed(e.to_string()))
    }
}

fn participant_info(participant: &RemoteParticipant) -> ParticipantInfo {
    ParticipantInfo {
        identity: participant.identity().0,
        name: participant.name(),
        is_agent: participant.kind() == ParticipantKind::Agent,
    }
}

fn track_info(publication: &RemoteTrackPublication) -> TrackInfo {
    TrackInfo {
        sid: publication.sid().to_string(),
        name: publication.name(),
        kind: match publication.kind() {
            LiveKitTrackKind::Audio => TrackKind::Audio,
            LiveKitTrackKind::Video => TrackKind::Video,
        },
    }
}

/// Frames of a subscribed track, resampled by WebRTC to the room rate
fn audio_frames(track: &livekit::track::RemoteAudioTrack) -> super::base::AudioFrameStream {
    let rate = SampleRate::Room.hz() as i32;
    NativeAudioStream::new(track.rtc_track(), rate, 1)
        .map(|frame| AudioFrame::mono(frame.data.into_owned(), SampleRate::Room))
        .boxed()
}

async fn run_event_loop(
    mut events: UnboundedReceiver<RoomEvent>,
    handler: Arc<dyn RoomEventHandler>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::ParticipantConnected(participant) => {
                handler.on_participant_joined(participant_info(&participant));
            }
            RoomEvent::ParticipantDisconnected(participant) => {
                handler.on_participant_left(participant_info(&participant));
            }
            RoomEvent::TrackPublished {
                publication,
                participant,
            } => {
                handler.on_track_published(participant_info(&participant), track_info(&publication));
            }
            RoomEvent::TrackSubscribed {
                track,
                publication,
                participant,
            } => match track {
                RemoteTrack::Audio(audio_track) => {
                    let remote = RemoteAudioTrack::new(track_info(&publication), audio_frames(&audio_track));
                    handler.on_track_subscribed(participant_info(&participant), remote);
                }
                RemoteTrack::Video(_) => {
                    debug!(
                        "Ignoring video track from {}",
                        participant.identity().0
                    );
                }
            },
            RoomEvent::TrackUnsubscribed {
                publication,
                participant,
                ..
            } => {
                handler.on_track_unsubscribed(participant_info(&participant), track_info(&publication));
            }
            RoomEvent::Disconnected { reason } => {
                warn!("LiveKit room disconnected: {:?}", reason);
                handler.on_disconnected(format!("{reason:?}"));
                break;
            }
            _ => {}
        }
    }
    debug!("LiveKit event loop finished");
}
