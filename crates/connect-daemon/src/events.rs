//! Delivery of playback events to the local engine.

use async_trait::async_trait;
use connect_proto::command::PlaybackEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[async_trait]
pub trait PlaybackEventSink: Send + Sync {
    /// Hand an event to the engine.  Errors are logged by the session and
    /// never stop the request from being acknowledged.
    async fn handle(&self, event: PlaybackEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl PlaybackEventSink for mpsc::Sender<PlaybackEvent> {
    async fn handle(&self, event: PlaybackEvent) -> anyhow::Result<()> {
        self.send(event)
            .await
            .map_err(|e| anyhow::anyhow!("playback engine gone: {}", e))
    }
}

/// Sink used when no engine is attached: events are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl PlaybackEventSink for LoggingSink {
    async fn handle(&self, event: PlaybackEvent) -> anyhow::Result<()> {
        match &event {
            PlaybackEvent::Play(play) => info!(
                context = %play.context_uri,
                index = ?play.track_index,
                "playback event: play"
            ),
            other => info!("playback event: {}", other.name()),
        }
        Ok(())
    }
}

/// Deliver `event`, logging sink failures.
pub async fn forward(sink: &dyn PlaybackEventSink, event: PlaybackEvent) {
    let name = event.name();
    if let Err(e) = sink.handle(event).await {
        warn!("event sink rejected {}: {}", name, e);
    }
}
