//! Shared application state

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::backend::CallRecordClient;
use crate::config::BridgeConfig;
use crate::errors::BridgeResult;
use crate::room::{AgentDispatcher, LiveKitDispatcher, LiveKitRoom, MediaRoom};
use crate::session::SessionDeps;

/// State shared by every request handler
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub room: Arc<dyn MediaRoom>,
    pub dispatcher: Option<Arc<dyn AgentDispatcher>>,
    pub backend: Option<CallRecordClient>,
    active_calls: AtomicUsize,
}

impl AppState {
    /// Build the LiveKit-backed state from configuration
    pub fn new(config: BridgeConfig) -> BridgeResult<Arc<Self>> {
        let room: Arc<dyn MediaRoom> = Arc::new(LiveKitRoom::new(&config.livekit)?);

        let dispatcher: Option<Arc<dyn AgentDispatcher>> =
            match LiveKitDispatcher::new(&config.livekit) {
                Ok(dispatcher) => Some(Arc::new(dispatcher)),
                Err(e) => {
                    warn!("Agent dispatch disabled: {}", e);
                    None
                }
            };

        let backend = match &config.backend_api_url {
            Some(url) => {
                info!("Call records go to {}", url);
                Some(CallRecordClient::new(url, config.timeouts.backend)?)
            }
            None => {
                info!("No backend API configured, call records disabled");
                None
            }
        };

        Ok(Self::with_room(config, room, dispatcher, backend))
    }

    /// Build state around explicit collaborators
    pub fn with_room(
        config: BridgeConfig,
        room: Arc<dyn MediaRoom>,
        dispatcher: Option<Arc<dyn AgentDispatcher>>,
        backend: Option<CallRecordClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            room,
            dispatcher,
            backend,
            active_calls: AtomicUsize::new(0),
        })
    }

    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            room: self.room.clone(),
            dispatcher: self.dispatcher.clone(),
            backend: self.backend.clone(),
        }
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    /// Count a call as active until the guard is dropped
    pub fn track_call(self: &Arc<Self>) -> ActiveCallGuard {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
        ActiveCallGuard {
            state: self.clone(),
        }
    }
}

pub struct ActiveCallGuard {
    state: Arc<AppState>,
}

impl Drop for ActiveCallGuard {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}
