//! Call-record client for the agent backend
//!
//! When an inbound call starts the bridge registers it with the backend so the
//! call shows up in the dashboard. Failures are logged and never affect the call.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::{BridgeError, BridgeResult};

/// Body of `POST /api/create-inbound-call/`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InboundCallRecord {
    pub call_uuid: String,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub room_name: String,
    pub agent_name: String,
    pub caller_name: String,
}

impl InboundCallRecord {
    pub fn new(
        call_uuid: impl Into<String>,
        from_number: Option<String>,
        to_number: Option<String>,
        room_name: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        let caller_name = caller_name(from_number.as_deref());
        Self {
            call_uuid: call_uuid.into(),
            from_number,
            to_number,
            room_name: room_name.into(),
            agent_name: agent_name.into(),
            caller_name,
        }
    }
}

/// "Caller <last four digits>"
fn caller_name(from_number: Option<&str>) -> String {
    let number = from_number.unwrap_or_default();
    let chars: Vec<char> = number.chars().collect();
    let last_four: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("Caller {last_four}")
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    call_db_id: Option<serde_json::Value>,
}

/// HTTP client for the backend call-record API
#[derive(Debug, Clone)]
pub struct CallRecordClient {
    client: Client,
    base_url: String,
}

impl CallRecordClient {
    pub fn new(base_url: &str, timeout: Duration) -> BridgeResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create the record, returning the backend's `call_db_id` when it sent one
    pub async fn create_inbound_call(
        &self,
        record: &InboundCallRecord,
    ) -> BridgeResult<Option<String>> {
        let url = format!("{}/api/create-inbound-call/", self.base_url);
        info!("Creating call record for inbound call {}", record.call_uuid);

        let response = self.client.post(&url).json(record).send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Backend(format!(
                "Failed to create call record: {status} - {body}"
            )));
        }

        let body: CreateCallResponse = response.json().await?;
        let call_db_id = body.call_db_id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        info!("Call record created: DB ID {:?}", call_db_id);
        Ok(call_db_id)
    }

    /// Fire-and-log variant used by the session
    pub async fn record_inbound_call(&self, record: InboundCallRecord) -> Option<String> {
        match self.create_inbound_call(&record).await {
            Ok(id) => id,
            Err(e) => {
                error!("Error creating call record: {}", e);
                None
            }
        }
    }
}
