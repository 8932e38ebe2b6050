use async_trait::async_trait;
use connect_daemon::spclient::ConnectApi;
use connect_daemon::transport::{CloseReason, Connector, FramePair, FrameSink, FrameStream};
use connect_daemon::{Session, SessionConfig, SessionDeps, SessionHandle};
use connect_proto::cluster::{Cluster, PutStateRequest};
use connect_proto::command::PlaybackEvent;
use connect_proto::config::DeviceConfig;
use connect_proto::error::{ConnectError, ConnectResult};
use connect_proto::state::RemoteState;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

pub const LOCAL_DEVICE: &str = "local-device";
pub const WAIT: Duration = Duration::from_secs(5);

// ── transport ────────────────────────────────────────────────────────────────

/// What the client wrote to a fake connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Close(CloseReason),
}

/// Server side of one fake dealer connection.
pub struct FakeServer {
    pub url: String,
    to_client: mpsc::UnboundedSender<Option<ConnectResult<String>>>,
    from_client: mpsc::UnboundedReceiver<Sent>,
}

impl FakeServer {
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(Some(Ok(frame.into())));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .to_client
            .send(Some(Err(ConnectError::Transport(message.to_string()))));
    }

    pub fn hang_up(&self) {
        let _ = self.to_client.send(None);
    }

    pub async fn next_sent(&mut self) -> Option<Sent> {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame that is not a keep-alive ping.
    pub async fn next_non_ping(&mut self) -> Option<Sent> {
        loop {
            match self.next_sent().await? {
                Sent::Text(t) if t.contains("\"ping\"") => continue,
                other => return Some(other),
            }
        }
    }
}

struct FakeSink(mpsc::UnboundedSender<Sent>);

#[async_trait]
impl FrameSink for FakeSink {
    async fn send(&mut self, text: String) -> ConnectResult<()> {
        self.0
            .send(Sent::Text(text))
            .map_err(|_| ConnectError::Transport("server gone".into()))
    }

    async fn close(&mut self, reason: CloseReason, _detail: String) -> ConnectResult<()> {
        let _ = self.0.send(Sent::Close(reason));
        Ok(())
    }
}

struct FakeStream(mpsc::UnboundedReceiver<Option<ConnectResult<String>>>);

#[async_trait]
impl FrameStream for FakeStream {
    async fn recv(&mut self) -> Option<ConnectResult<String>> {
        self.0.recv().await.flatten()
    }
}

/// Hands every connection attempt to the test as a [`FakeServer`].
pub struct FakeConnector {
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl FakeConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { servers: tx }, rx)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> ConnectResult<FramePair> {
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.servers
            .send(FakeServer {
                url: url.to_string(),
                to_client,
                from_client,
            })
            .map_err(|_| ConnectError::Transport("test finished".into()))?;
        Ok((Box::new(FakeSink(client_tx)), Box::new(FakeStream(client_rx))))
    }
}

// ── connect-state API ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostedCommand {
    pub from: String,
    pub to: String,
    pub body: Value,
}

#[derive(Default)]
struct ApiLog {
    clusters: VecDeque<Cluster>,
    puts: Vec<(String, PutStateRequest)>,
    commands: Vec<PostedCommand>,
    fail_commands: bool,
    hold: Option<oneshot::Receiver<()>>,
}

/// Records calls and answers PUTs from a queue of clusters (default cluster
/// once the queue is empty).
#[derive(Clone, Default)]
pub struct FakeApi {
    log: Arc<Mutex<ApiLog>>,
}

impl FakeApi {
    pub fn respond_with(&self, cluster: Cluster) {
        self.log.lock().unwrap().clusters.push_back(cluster);
    }

    /// Make every subsequent command POST fail like an HTTP 500.
    pub fn fail_commands(&self) {
        self.log.lock().unwrap().fail_commands = true;
    }

    /// Hold the next PUT until the returned sender fires (or is dropped).
    /// Its response is taken from the queue on release.
    pub fn hold_next_put(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.log.lock().unwrap().hold = Some(rx);
        tx
    }

    pub fn puts(&self) -> Vec<(String, PutStateRequest)> {
        self.log.lock().unwrap().puts.clone()
    }

    pub async fn wait_for_puts(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.log.lock().unwrap().puts.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("PUT expected");
    }

    pub fn commands(&self) -> Vec<PostedCommand> {
        self.log.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl ConnectApi for FakeApi {
    async fn put_state(
        &self,
        connection_id: &str,
        request: &PutStateRequest,
    ) -> ConnectResult<Cluster> {
        let hold = {
            let mut log = self.log.lock().unwrap();
            log.puts.push((connection_id.to_string(), request.clone()));
            log.hold.take()
        };
        if let Some(release) = hold {
            let _ = release.await;
        }
        Ok(self.log.lock().unwrap().clusters.pop_front().unwrap_or_default())
    }

    async fn post_command(&self, from: &str, to: &str, body: &Value) -> ConnectResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_commands {
            return Err(ConnectError::Transport("command: HTTP 500".into()));
        }
        log.commands.push(PostedCommand {
            from: from.to_string(),
            to: to.to_string(),
            body: body.clone(),
        });
        Ok(())
    }
}

// ── session harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub session: SessionHandle,
    pub servers: mpsc::UnboundedReceiver<FakeServer>,
    pub api: FakeApi,
    pub events: mpsc::Receiver<PlaybackEvent>,
    pub cancel: CancellationToken,
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        device_id: LOCAL_DEVICE.to_string(),
        device: DeviceConfig::default(),
        dealer_url: "wss://dealer.test".to_string(),
        user_id: Some("alice".to_string()),
        reconnect_delay: Duration::from_millis(20),
        ping_interval: Duration::from_secs(60),
    }
}

pub fn start_session(config: SessionConfig) -> Harness {
    let (connector, servers) = FakeConnector::new();
    let api = FakeApi::default();
    let (events_tx, events) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let deps = SessionDeps {
        connector: Arc::new(connector),
        api: Arc::new(api.clone()),
        tokens: Arc::new(connect_daemon::token::StaticTokenProvider::new("token-1")),
        events: Arc::new(events_tx),
        resolver: None,
    };
    let session = Session::start(config, deps, cancel.clone());
    Harness {
        session,
        servers,
        api,
        events,
        cancel,
    }
}

impl Harness {
    pub async fn next_server(&mut self) -> FakeServer {
        tokio::time::timeout(WAIT, self.servers.recv())
            .await
            .expect("connection attempt expected")
            .expect("connector alive")
    }

    pub async fn next_event(&mut self) -> PlaybackEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("playback event expected")
            .expect("session alive")
    }

    /// Connect and handshake, returning the server once the announcement's
    /// state has been published.
    pub async fn connect_ready(&mut self, connection_id: &str) -> FakeServer {
        let mut updates = self.session.state_updates();
        updates.borrow_and_update();
        let server = self.next_server().await;
        server.push(super::frames::handshake(connection_id));
        wait_for_state(&mut updates, |_| true).await;
        server
    }
}

/// Wait for the next published snapshot matching `pred`.
pub async fn wait_for_state(
    updates: &mut watch::Receiver<Arc<RemoteState>>,
    pred: impl Fn(&RemoteState) -> bool,
) -> Arc<RemoteState> {
    tokio::time::timeout(WAIT, async {
        loop {
            updates.changed().await.expect("session alive");
            let state = updates.borrow_and_update().clone();
            if pred(&state) {
                return state;
            }
        }
    })
    .await
    .expect("state update expected")
}
