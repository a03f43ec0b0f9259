//! # Config Commands
//!
//! Read-only view of the configuration and of what the agent is running.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;
use vitrina_sync::{AgentStatus, DeviceRole};

/// Configuration as shown to the user. The API token is never returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub device_id: String,
    pub device_name: String,
    pub role: DeviceRole,
    pub backend_url: String,
    pub has_api_token: bool,
    pub stock_refresh_secs: u64,
    pub confirmation_poll_secs: u64,
    pub queue_refresh_secs: u64,
    pub max_proof_bytes: usize,
    pub utc_offset_minutes: i32,
}

/// Gets the current configuration.
pub fn get_config(state: &AppState) -> ConfigResponse {
    debug!("get_config command");
    let config = state.config();

    ConfigResponse {
        device_id: config.device.id.clone(),
        device_name: config.device.name.clone(),
        role: config.role(),
        backend_url: config.backend.base_url.clone(),
        has_api_token: config.backend.api_token.is_some(),
        stock_refresh_secs: config.polling.stock_refresh_secs,
        confirmation_poll_secs: config.polling.confirmation_poll_secs,
        queue_refresh_secs: config.polling.queue_refresh_secs,
        max_proof_bytes: config.proof.max_bytes,
        utc_offset_minutes: config.store.offset().local_minus_utc() / 60,
    }
}

/// Background tasks currently running.
pub async fn get_status(state: &AppState) -> AgentStatus {
    debug!("get_status command");
    state.status().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::customer_state;

    #[tokio::test]
    async fn test_config_hides_token() {
        let (state, _) = customer_state(&[]).await;
        let config = get_config(&state);

        assert_eq!(config.role, DeviceRole::Customer);
        assert!(!config.has_api_token);
        assert_eq!(config.utc_offset_minutes, 0);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"deviceId\""));
        assert!(!json.contains("apiToken\":"));
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let (state, _) = customer_state(&[]).await;
        let status = get_status(&state).await;
        assert!(status.running_tasks.is_empty());
        assert_eq!(status.device_id, state.config().device_id());
    }
}
