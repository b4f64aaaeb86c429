//! Remote participant bookkeeping

use std::collections::HashMap;

use crate::room::{ParticipantInfo, TrackInfo};

/// Who is in the room, which of them is the agent, and their audio tracks
#[derive(Debug, Default)]
pub struct ParticipantBook {
    participants: HashMap<String, ParticipantInfo>,
    audio_tracks: HashMap<String, Vec<TrackInfo>>,
    agent_identity: Option<String>,
    agent_found: bool,
}

impl ParticipantBook {
    /// Record a participant. Returns true when it is (now) the call's agent.
    pub fn join(&mut self, participant: ParticipantInfo, agent_name: &str) -> bool {
        let identity = participant.identity.clone();
        let is_agent = participant.is_agent_for(agent_name);
        self.participants.insert(identity.clone(), participant);

        if is_agent {
            self.agent_identity = Some(identity);
            self.agent_found = true;
        }
        is_agent
    }

    /// Forget a participant and its tracks
    pub fn leave(&mut self, identity: &str) -> Option<ParticipantInfo> {
        self.audio_tracks.remove(identity);
        if self.agent_identity.as_deref() == Some(identity) {
            self.agent_identity = None;
        }
        self.participants.remove(identity)
    }

    pub fn is_agent(&self, identity: &str) -> bool {
        self.agent_identity.as_deref() == Some(identity)
    }

    pub fn agent_identity(&self) -> Option<&str> {
        self.agent_identity.as_deref()
    }

    /// An agent joined at some point during the call
    pub fn agent_found(&self) -> bool {
        self.agent_found
    }

    pub fn add_audio_track(&mut self, identity: &str, track: TrackInfo) {
        let tracks = self.audio_tracks.entry(identity.to_string()).or_default();
        if !tracks.iter().any(|t| t.sid == track.sid) {
            tracks.push(track);
        }
    }

    pub fn remove_audio_track(&mut self, identity: &str, sid: &str) {
        if let Some(tracks) = self.audio_tracks.get_mut(identity) {
            tracks.retain(|t| t.sid != sid);
        }
    }

    pub fn audio_tracks(&self, identity: &str) -> &[TrackInfo] {
        self.audio_tracks
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
