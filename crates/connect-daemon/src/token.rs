//! Access token collaborators.
//!
//! Obtaining and refreshing tokens is out of scope for the daemon; it only
//! asks a [`TokenProvider`] before each connection attempt and HTTP call.

use async_trait::async_trait;
use connect_proto::error::{ConnectError, ConnectResult};
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> ConnectResult<String>;
}

/// A token that can be replaced at runtime (e.g. by an external refresher).
#[derive(Clone, Default)]
pub struct StaticTokenProvider {
    token: Arc<RwLock<Option<String>>>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> ConnectResult<String> {
        self.token
            .read()
            .await
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConnectError::Transport("no access token configured".into()))
    }
}
