//! Explicit agent dispatch through the LiveKit server API

use async_trait::async_trait;
use livekit_api::services::agent_dispatch::AgentDispatchClient;
use livekit_protocol::CreateAgentDispatchRequest;
use tracing::info;

use super::base::{AgentDispatcher, RoomError, RoomResult};
use super::livekit::service_url;
use crate::config::LiveKitConfig;

/// [`AgentDispatcher`] using LiveKit's `AgentDispatchService`
pub struct LiveKitDispatcher {
    client: AgentDispatchClient,
}

impl LiveKitDispatcher {
    pub fn new(config: &LiveKitConfig) -> RoomResult<Self> {
        let (Some(api_key), Some(api_secret)) = (&config.api_key, &config.api_secret) else {
            return Err(RoomError::InvalidConfiguration(
                "LIVEKIT_API_KEY and LIVEKIT_API_SECRET are required for agent dispatch"
                    .to_string(),
            ));
        };

        let host = service_url(&config.url);
        Ok(Self {
            client: AgentDispatchClient::with_api_key(&host, api_key, api_secret),
        })
    }
}

#[async_trait]
impl AgentDispatcher for LiveKitDispatcher {
    async fn dispatch(
        &self,
        room_name: &str,
        agent_name: &str,
        metadata: Option<String>,
    ) -> RoomResult<String> {
        let dispatch = self
            .client
            .create_dispatch(CreateAgentDispatchRequest {
                agent_name: agent_name.to_string(),
                room: room_name.to_string(),
                metadata: metadata.unwrap_or_default(),
                ..Default::default()
            })
            .await
            .map_err(|e| RoomError::Dispatch(e.to_string()))?;

        info!(
            room = %room_name,
            "Dispatched agent '{}' (dispatch id {})", agent_name, dispatch.id
        );
        Ok(dispatch.id)
    }
}
