//! Outbound player commands.

use connect_proto::command::command_envelope;
use connect_proto::error::{ConnectError, ConnectResult};
use connect_proto::state::RemoteState;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::spclient::ConnectApi;

pub struct CommandDispatcher {
    api: Arc<dyn ConnectApi>,
    device_id: String,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn ConnectApi>, device_id: impl Into<String>) -> Self {
        Self {
            api,
            device_id: device_id.into(),
        }
    }

    /// Send `name` with `params` to the device active in `state`.
    pub async fn invoke(
        &self,
        state: &RemoteState,
        name: &str,
        params: Map<String, Value>,
    ) -> ConnectResult<()> {
        let target = state
            .active_device_id
            .as_deref()
            .ok_or(ConnectError::NoActiveDevice)?;
        let body = command_envelope(name, params);
        debug!(command = name, to = target, "dispatching command");
        self.api.post_command(&self.device_id, target, &body).await
    }
}
