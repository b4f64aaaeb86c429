//! Session state, flags and counters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Connecting,
    Active,
    Terminating,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Terminating => "terminating",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Whether the bridge has to bring an agent into the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// New call; an agent is dispatched into the room
    Inbound,
    /// The agent is already in the room (it placed the call)
    Outbound,
}

impl CallType {
    pub fn needs_dispatch(&self) -> bool {
        matches!(self, CallType::Inbound)
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Inbound => f.write_str("inbound"),
            CallType::Outbound => f.write_str("outbound"),
        }
    }
}

/// Why a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Telephony WebSocket closed or errored
    WebSocketClosed,
    /// Telephony sent `stop`
    TelephonyStop,
    /// Room dropped us without being asked to
    RoomDisconnected,
    RoomConnectFailed,
    AgentDisconnected,
    /// Every other participant left
    RoomEmpty,
    /// Outbound audio could not be delivered
    SendFailures,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TerminationReason::WebSocketClosed => "WebSocket closed",
            TerminationReason::TelephonyStop => "Telephony stop",
            TerminationReason::RoomDisconnected => "Room disconnected",
            TerminationReason::RoomConnectFailed => "Room connection failed",
            TerminationReason::AgentDisconnected => "Agent disconnected",
            TerminationReason::RoomEmpty => "Room empty",
            TerminationReason::SendFailures => "Too many send failures",
        };
        f.write_str(reason)
    }
}

/// Call flags shared between the session's tasks
#[derive(Debug, Default)]
pub struct CallFlags {
    call_started: AtomicBool,
    call_active: AtomicBool,
    call_ended: AtomicBool,
    cleanup_started: AtomicBool,
    force_stop: AtomicBool,
    agent_speaking: AtomicBool,
}

impl CallFlags {
    pub fn call_started(&self) -> bool {
        self.call_started.load(Ordering::Acquire)
    }

    pub fn call_active(&self) -> bool {
        self.call_active.load(Ordering::Acquire)
    }

    pub fn call_ended(&self) -> bool {
        self.call_ended.load(Ordering::Acquire)
    }

    pub fn cleanup_started(&self) -> bool {
        self.cleanup_started.load(Ordering::SeqCst)
    }

    /// No audio may be sent once this is true
    pub fn is_ending(&self) -> bool {
        self.call_ended() || self.force_stop.load(Ordering::Acquire)
    }

    pub fn agent_speaking(&self) -> bool {
        self.agent_speaking.load(Ordering::Acquire)
    }

    pub(crate) fn set_agent_speaking(&self, speaking: bool) {
        self.agent_speaking.store(speaking, Ordering::Release);
    }

    pub(crate) fn mark_started(&self) {
        self.call_started.store(true, Ordering::Release);
        self.call_active.store(true, Ordering::Release);
    }

    /// Set `call_ended`; returns false when it was already set
    pub(crate) fn end_call(&self) -> bool {
        !self.call_ended.swap(true, Ordering::AcqRel)
    }

    /// Claim the cleanup; only the first caller gets true.
    ///
    /// SeqCst: paired with the room connect, which publishes its connection
    /// and then checks this flag, so one of the two always sees the other.
    pub(crate) fn begin_cleanup(&self) -> bool {
        self.cleanup_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn force_stop(&self) {
        self.force_stop.store(true, Ordering::Release);
        self.agent_speaking.store(false, Ordering::Release);
    }

    pub(crate) fn deactivate(&self) {
        self.call_active.store(false, Ordering::Release);
    }
}

/// Traffic counters for the session summary
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub messages_received: AtomicU64,
    pub bytes_from_telephony: AtomicU64,
    pub frames_to_room: AtomicU64,
    pub frames_from_agent: AtomicU64,
    /// Caller frames that arrived before the room track existed
    pub dropped_frames: AtomicU64,
    /// Undecodable or undeliverable caller frames
    pub frame_errors: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn incr(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
