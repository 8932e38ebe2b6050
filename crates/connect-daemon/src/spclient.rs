//! HTTP calls to the connect-state service.

use async_trait::async_trait;
use connect_proto::cluster::{Cluster, PutStateRequest};
use connect_proto::error::{ConnectError, ConnectResult, DecodeError};
use connect_proto::protocol::{gunzip, gzip};
use prost::Message;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::token::TokenProvider;

const PROTOBUF: &str = "application/x-protobuf";
const CONNECTION_ID_HEADER: &str = "X-Spotify-Connection-Id";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The two HTTP operations the session needs.
#[async_trait]
pub trait ConnectApi: Send + Sync {
    /// PUT this device's state; the response is the current cluster.
    async fn put_state(
        &self,
        connection_id: &str,
        request: &PutStateRequest,
    ) -> ConnectResult<Cluster>;

    /// POST a player command to `to_device`.  Only the status is checked.
    async fn post_command(&self, from_device: &str, to_device: &str, body: &Value)
        -> ConnectResult<()>;

    /// Point subsequent calls at a freshly resolved spclient host.
    fn set_base_url(&self, _base_url: &str) {}
}

#[derive(Clone)]
pub struct SpClient {
    client: Client,
    base_url: Arc<RwLock<String>>,
    device_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl SpClient {
    pub fn new(
        base_url: impl Into<String>,
        device_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> ConnectResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("connectd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ConnectError::transport)?;
        Ok(Self {
            client,
            base_url: Arc::new(RwLock::new(base_url.into())),
            device_id: device_id.into(),
            tokens,
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConnectApi for SpClient {
    async fn put_state(
        &self,
        connection_id: &str,
        request: &PutStateRequest,
    ) -> ConnectResult<Cluster> {
        let url = format!(
            "{}/connect-state/v1/devices/{}",
            self.base_url(),
            self.device_id
        );
        let body = gzip(&request.encode_to_vec()).map_err(DecodeError::from)?;
        let token = self.tokens.access_token().await?;

        debug!(reason = request.put_state_reason, "PUT {}", url);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(token)
            .header(CONNECTION_ID_HEADER, connection_id)
            .header(CONTENT_TYPE, PROTOBUF)
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip")
            .body(body)
            .send()
            .await
            .map_err(ConnectError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ConnectError::Transport(format!("PUT state: HTTP {}", status)));
        }
        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|v| v.as_bytes() == b"gzip");
        let bytes = resp.bytes().await.map_err(ConnectError::transport)?;
        let raw = if gzipped || bytes.starts_with(&GZIP_MAGIC) {
            gunzip(&bytes).map_err(DecodeError::from)?
        } else {
            bytes.to_vec()
        };
        Ok(Cluster::decode(raw.as_slice()).map_err(DecodeError::from)?)
    }

    async fn post_command(
        &self,
        from_device: &str,
        to_device: &str,
        body: &Value,
    ) -> ConnectResult<()> {
        let url = format!(
            "{}/connect-state/v1/player/command/from/{}/to/{}",
            self.base_url(),
            from_device,
            to_device
        );
        let token = self.tokens.access_token().await?;

        debug!("POST {} {}", url, body);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(ConnectError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ConnectError::Transport(format!("command: HTTP {}", status)));
        }
        Ok(())
    }

    fn set_base_url(&self, base_url: &str) {
        if let Ok(mut current) = self.base_url.write() {
            *current = base_url.to_string();
        }
    }
}
