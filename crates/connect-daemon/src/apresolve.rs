//! Access point resolution for the dealer and spclient hosts.

use async_trait::async_trait;
use connect_proto::error::{ConnectError, ConnectResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `wss://host:port`
    pub dealer_url: String,
    /// `https://host:port`
    pub spclient_url: String,
}

#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self) -> ConnectResult<Endpoints>;
}

#[derive(Deserialize)]
struct ApResolveResponse {
    #[serde(default)]
    dealer: Vec<String>,
    #[serde(default)]
    spclient: Vec<String>,
}

pub struct ApResolver {
    client: Client,
    url: String,
    fallback: Endpoints,
}

impl ApResolver {
    pub fn new(url: impl Into<String>, fallback: Endpoints) -> ConnectResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ConnectError::transport)?;
        Ok(Self {
            client,
            url: url.into(),
            fallback,
        })
    }

    async fn query(&self) -> ConnectResult<Endpoints> {
        let url = format!("{}/", self.url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("type", "dealer"), ("type", "spclient")])
            .send()
            .await
            .map_err(ConnectError::transport)?;
        if !resp.status().is_success() {
            return Err(ConnectError::Transport(format!(
                "apresolve: HTTP {}",
                resp.status()
            )));
        }
        let body: ApResolveResponse = resp.json().await.map_err(ConnectError::transport)?;
        let dealer = body
            .dealer
            .first()
            .ok_or_else(|| ConnectError::Transport("apresolve: no dealer host".into()))?;
        let spclient = body
            .spclient
            .first()
            .ok_or_else(|| ConnectError::Transport("apresolve: no spclient host".into()))?;
        Ok(Endpoints {
            dealer_url: format!("wss://{}", dealer),
            spclient_url: format!("https://{}", spclient),
        })
    }
}

#[async_trait]
impl EndpointResolver for ApResolver {
    /// Never fails: resolution errors fall back to the configured hosts.
    async fn resolve(&self) -> ConnectResult<Endpoints> {
        match self.query().await {
            Ok(endpoints) => {
                debug!(dealer = %endpoints.dealer_url, spclient = %endpoints.spclient_url, "apresolve");
                Ok(endpoints)
            }
            Err(e) => {
                warn!("apresolve failed, using configured endpoints: {}", e);
                Ok(self.fallback.clone())
            }
        }
    }
}

/// Resolver that always returns the same endpoints.
pub struct FixedEndpoints(pub Endpoints);

#[async_trait]
impl EndpointResolver for FixedEndpoints {
    async fn resolve(&self) -> ConnectResult<Endpoints> {
        Ok(self.0.clone())
    }
}
