//! The remote Connect session.
//!
//! Architecture:
//!
//! ```text
//!   Session::start()
//!         │
//!         └── supervisor            ← connect / handshake / read, then sleep and retry
//!               ├── writer_task     ← owns the FrameSink, fed through mpsc
//!               ├── keepalive_task  ← pings through the writer every interval
//!               └── read loop       ← owns the FrameStream
//!                      ├── cluster update  → RemoteState (watch)
//!                      ├── collection      → LibraryChanged (broadcast)
//!                      ├── rootlist        → RootlistChanged (broadcast)
//!                      └── request         → PlaybackEvent sink, then reply
//! ```
//!
//! [`SessionHandle`] is cheaply cloneable and is the only way consumers read
//! state or send commands.  The supervisor is the single writer of the
//! connection id; the only snapshots published outside the read loop are
//! local-state PUT responses, swapped in atomically and only when they are
//! from the live connection and not older than the current snapshot.

use connect_proto::cluster::{ClusterUpdate, PlayerState};
use connect_proto::command::{
    repeat_params, seek_params, shuffle_params, CommandRequest, Endpoint, PlaybackEvent,
    CMD_PAUSE, CMD_RESUME, CMD_SEEK_TO, CMD_SET_OPTIONS, CMD_SET_SHUFFLE, CMD_SKIP_NEXT,
    CMD_SKIP_PREV,
};
use connect_proto::config::{Config, DeviceConfig};
use connect_proto::error::{ConnectError, ConnectResult};
use connect_proto::library::{decode_collection, LibraryChanged, RootlistChanged};
use connect_proto::platform::now_millis;
use connect_proto::protocol::{
    classify_notification, dealer_url, parse_frame, ping_frame, reply_frame, DealerMessage,
    NotificationKind,
};
use connect_proto::state::{
    cluster_to_state, new_device_request, player_state_request, RemoteState, RepeatState,
};
use prost::Message;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::apresolve::EndpointResolver;
use crate::dispatcher::CommandDispatcher;
use crate::events::{self, PlaybackEventSink};
use crate::spclient::ConnectApi;
use crate::token::TokenProvider;
use crate::transport::{CloseReason, Connector, FrameSink, FrameStream};

const NOTIFICATION_CAPACITY: usize = 64;
const WRITER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_id: String,
    pub device: DeviceConfig,
    pub dealer_url: String,
    /// Needed to recognise rootlist notifications.
    pub user_id: Option<String>,
    /// Fixed delay between connection attempts.
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_id: config.device_id(),
            device: config.device.clone(),
            dealer_url: config.session.dealer_url.clone(),
            user_id: config.session.user_id.clone(),
            reconnect_delay: config.session.reconnect_delay(),
            ping_interval: config.session.ping_interval(),
        }
    }
}

/// Collaborators the session is built from.
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub api: Arc<dyn ConnectApi>,
    pub tokens: Arc<dyn TokenProvider>,
    pub events: Arc<dyn PlaybackEventSink>,
    /// When set, dealer/spclient hosts are resolved before each attempt.
    pub resolver: Option<Arc<dyn EndpointResolver>>,
}

struct Shared {
    config: SessionConfig,
    deps: SessionDeps,
    dispatcher: CommandDispatcher,
    state_tx: watch::Sender<Arc<RemoteState>>,
    link: RwLock<Option<Link>>,
    library_tx: broadcast::Sender<LibraryChanged>,
    rootlist_tx: broadcast::Sender<RootlistChanged>,
    rev: AtomicU64,
    cancel: CancellationToken,
}

/// The established connection: its id and the epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    connection_id: String,
    epoch: u64,
}

pub struct Session;

impl Session {
    /// Spawn the session.  Never blocks; connection failures are retried
    /// until `cancel` fires.
    pub fn start(
        config: SessionConfig,
        deps: SessionDeps,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (state_tx, _) = watch::channel(Arc::new(RemoteState::default()));
        let (library_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (rootlist_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let dispatcher = CommandDispatcher::new(deps.api.clone(), config.device_id.clone());

        let shared = Arc::new(Shared {
            config,
            deps,
            dispatcher,
            state_tx,
            link: RwLock::new(None),
            library_tx,
            rootlist_tx,
            rev: AtomicU64::new(0),
            cancel,
        });

        let task = tokio::spawn(supervise(shared.clone()));
        SessionHandle {
            shared,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub fn device_id(&self) -> &str {
        &self.shared.config.device_id
    }

    /// Latest snapshot.
    pub fn state(&self) -> Arc<RemoteState> {
        self.shared.state_tx.borrow().clone()
    }

    /// The receiver yields the current snapshot immediately, then the latest
    /// one after every change.
    pub fn state_updates(&self) -> watch::Receiver<Arc<RemoteState>> {
        self.shared.state_tx.subscribe()
    }

    pub fn library_changed(&self) -> broadcast::Receiver<LibraryChanged> {
        self.shared.library_tx.subscribe()
    }

    pub fn rootlist_changed(&self) -> broadcast::Receiver<RootlistChanged> {
        self.shared.rootlist_tx.subscribe()
    }

    /// Set once the device has been announced on the current connection and
    /// that connection's first state is published.
    pub async fn connection_id(&self) -> Option<String> {
        self.shared.ready_link().await.map(|link| link.connection_id)
    }

    pub async fn is_ready(&self) -> bool {
        self.connection_id().await.is_some()
    }

    pub async fn send_command(&self, name: &str, params: Map<String, Value>) -> ConnectResult<()> {
        let link = self.shared.link().await.ok_or(ConnectError::NotReady)?;
        let state = self.state();
        if state.epoch != link.epoch {
            return Err(ConnectError::NotReady);
        }
        self.shared.dispatcher.invoke(&state, name, params).await
    }

    pub async fn takeover(&self) -> ConnectResult<()> {
        self.shared.takeover().await
    }

    pub async fn pause(&self) -> ConnectResult<()> {
        self.send_command(CMD_PAUSE, Map::new()).await
    }

    pub async fn resume(&self) -> ConnectResult<()> {
        self.send_command(CMD_RESUME, Map::new()).await
    }

    pub async fn skip_next(&self) -> ConnectResult<()> {
        self.send_command(CMD_SKIP_NEXT, Map::new()).await
    }

    pub async fn skip_previous(&self) -> ConnectResult<()> {
        self.send_command(CMD_SKIP_PREV, Map::new()).await
    }

    pub async fn seek_to(&self, position: Duration) -> ConnectResult<()> {
        self.send_command(CMD_SEEK_TO, seek_params(position)).await
    }

    pub async fn set_shuffle(&self, shuffling: bool) -> ConnectResult<()> {
        self.send_command(CMD_SET_SHUFFLE, shuffle_params(shuffling)).await
    }

    pub async fn set_repeat(&self, repeat: RepeatState) -> ConnectResult<()> {
        self.send_command(CMD_SET_OPTIONS, repeat_params(repeat)).await
    }

    /// PUT the local player state.  A no-op until a connection id exists.
    ///
    /// The returned cluster is published only if the connection is still the
    /// one the PUT went out on and nothing newer has been published since.
    pub async fn publish_local_state(&self, player_state: PlayerState) -> ConnectResult<()> {
        let Some(link) = self.shared.ready_link().await else {
            debug!("not connected, skipping local state publication");
            return Ok(());
        };
        let config = &self.shared.config;
        let request =
            player_state_request(&config.device, &config.device_id, player_state, now_millis());
        let cluster = self
            .shared
            .deps
            .api
            .put_state(&link.connection_id, &request)
            .await?;

        if self.shared.link().await.as_ref() != Some(&link) {
            debug!(epoch = link.epoch, "connection changed during PUT, dropping response");
            return Ok(());
        }
        let state = cluster_to_state(&cluster, &config.device_id);
        if !self.shared.publish_if_newer(state, link.epoch) {
            debug!(epoch = link.epoch, "stale PUT response, keeping current state");
        }
        Ok(())
    }

    /// Cancel the session and wait for the supervisor to finish.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("session task panicked: {}", e);
            }
        }
    }
}

impl Shared {
    /// Publish in receipt order.  `rev` is assigned under the channel lock so
    /// it only ever grows.
    fn publish(&self, state: RemoteState, epoch: u64) {
        self.state_tx
            .send_modify(|current| *current = Arc::new(self.stamp(state, epoch)));
    }

    /// Compare-and-swap publication: only if `epoch` is the epoch of the
    /// current snapshot and `state` is not older than it.
    fn publish_if_newer(&self, state: RemoteState, epoch: u64) -> bool {
        self.state_tx.send_if_modified(|current| {
            if current.epoch != epoch || state.timestamp_ms < current.timestamp_ms {
                return false;
            }
            *current = Arc::new(self.stamp(state, epoch));
            true
        })
    }

    fn stamp(&self, mut state: RemoteState, epoch: u64) -> RemoteState {
        state.rev = self.rev.fetch_add(1, Ordering::SeqCst) + 1;
        state.epoch = epoch;
        debug!(
            rev = state.rev,
            epoch,
            active = ?state.active_device_id,
            playing = state.is_playing,
            "remote state updated"
        );
        state
    }

    async fn link(&self) -> Option<Link> {
        self.link.read().await.clone()
    }

    /// The link, once the published state belongs to it.  Until then
    /// commands would route on the previous connection's state.
    async fn ready_link(&self) -> Option<Link> {
        let link = self.link().await?;
        (self.state_tx.borrow().epoch == link.epoch).then_some(link)
    }

    async fn set_link(&self, link: Option<Link>) {
        *self.link.write().await = link;
    }

    async fn takeover(&self) -> ConnectResult<()> {
        let state = self.state_tx.borrow().clone();
        let play = state
            .takeover_request(now_millis())
            .ok_or(ConnectError::NothingPlaying)?;
        info!(context = %play.context_uri, "taking over playback");
        events::forward(self.deps.events.as_ref(), PlaybackEvent::Play(play)).await;
        Ok(())
    }
}

// ── supervisor ────────────────────────────────────────────────────────────────

async fn supervise(shared: Arc<Shared>) {
    let mut epoch = 0u64;
    loop {
        epoch += 1;
        match run_connection(&shared, epoch).await {
            Ok(()) => info!(epoch, "dealer connection ended"),
            Err(e) => warn!(epoch, "dealer connection failed: {}", e),
        }
        shared.set_link(None).await;

        if shared.cancel.is_cancelled() {
            break;
        }
        let delay = shared.config.reconnect_delay;
        info!("reconnecting in {:?}", delay);
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!("session stopped");
}

enum Outbound {
    Text(String),
    Close(CloseReason, String),
}

/// One connection attempt.  `Ok` on cancellation, `Err` on anything that
/// warrants a reconnect.
async fn run_connection(shared: &Arc<Shared>, epoch: u64) -> ConnectResult<()> {
    let cancel = &shared.cancel;

    let Some(base) = cancellable(cancel, dealer_base(shared)).await else {
        return Ok(());
    };
    let base = base?;
    let Some(token) = cancellable(cancel, shared.deps.tokens.access_token()).await else {
        return Ok(());
    };
    let url = dealer_url(&base, &token?);

    info!(epoch, "connecting to dealer {}", base);
    let Some(connected) = cancellable(cancel, shared.deps.connector.connect(&url)).await else {
        return Ok(());
    };
    let (sink, mut stream) = connected?;

    // Cancelled on external cancellation, on write failure and when this
    // attempt ends.
    let conn = cancel.child_token();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(WRITER_CAPACITY);
    let writer = tokio::spawn(writer_task(sink, out_rx, conn.clone()));

    let result = drive_connection(shared, epoch, &mut *stream, &out_tx, &conn).await;

    let close = match (&result, cancel.is_cancelled()) {
        (Err(ConnectError::ProtocolViolation(detail)), _) => {
            Some((CloseReason::ProtocolError, detail.clone()))
        }
        (_, true) => Some((CloseReason::Normal, "session stopped".to_string())),
        _ => None,
    };
    if let Some((reason, detail)) = close {
        let _ = out_tx.send(Outbound::Close(reason, detail)).await;
    }
    drop(out_tx);
    conn.cancel();
    if let Err(e) = writer.await {
        error!("dealer writer panicked: {}", e);
    }
    result
}

async fn cancellable<F: std::future::Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Dealer base URL for this attempt, re-pointing the spclient when
/// endpoints are resolved.
async fn dealer_base(shared: &Shared) -> ConnectResult<String> {
    match &shared.deps.resolver {
        Some(resolver) => {
            let endpoints = resolver.resolve().await?;
            shared.deps.api.set_base_url(&endpoints.spclient_url);
            Ok(endpoints.dealer_url)
        }
        None => Ok(shared.config.dealer_url.clone()),
    }
}

async fn drive_connection(
    shared: &Arc<Shared>,
    epoch: u64,
    stream: &mut dyn FrameStream,
    out_tx: &mpsc::Sender<Outbound>,
    conn: &CancellationToken,
) -> ConnectResult<()> {
    // Handshake
    let first = tokio::select! {
        _ = conn.cancelled() => return Ok(()),
        frame = stream.recv() => frame,
    };
    let text = match first {
        Some(Ok(text)) => text,
        Some(Err(e)) => return Err(e),
        None => return Err(ConnectError::Transport("closed before handshake".into())),
    };
    let connection_id = match parse_frame(&text) {
        Ok(msg) => match msg.connection_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(ConnectError::ProtocolViolation(format!(
                    "expected connection handshake, got {}",
                    msg.kind()
                )))
            }
        },
        Err(e) => {
            return Err(ConnectError::ProtocolViolation(format!(
                "undecodable handshake: {}",
                e
            )))
        }
    };
    info!(epoch, "dealer handshake complete");

    tokio::spawn(keepalive_task(
        out_tx.clone(),
        shared.config.ping_interval,
        conn.clone(),
    ));

    // Announce the device; the returned cluster is the first state of this
    // connection.
    let config = &shared.config;
    let announce = new_device_request(&config.device, &config.device_id, now_millis());
    let cluster = tokio::select! {
        _ = conn.cancelled() => return lost_or_stopped(shared),
        cluster = shared.deps.api.put_state(&connection_id, &announce) => cluster?,
    };
    shared
        .set_link(Some(Link {
            connection_id,
            epoch,
        }))
        .await;
    shared.publish(cluster_to_state(&cluster, &config.device_id), epoch);

    loop {
        let frame = tokio::select! {
            _ = conn.cancelled() => return lost_or_stopped(shared),
            frame = stream.recv() => frame,
        };
        match frame {
            Some(Ok(text)) => handle_frame(shared, epoch, &text, out_tx).await?,
            Some(Err(e)) => return Err(e),
            None => return Err(ConnectError::Transport("closed by dealer".into())),
        }
    }
}

fn lost_or_stopped(shared: &Shared) -> ConnectResult<()> {
    if shared.cancel.is_cancelled() {
        Ok(())
    } else {
        Err(ConnectError::Transport("connection lost".into()))
    }
}

async fn handle_frame(
    shared: &Arc<Shared>,
    epoch: u64,
    text: &str,
    out_tx: &mpsc::Sender<Outbound>,
) -> ConnectResult<()> {
    let msg = match parse_frame(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("dropping undecodable dealer frame: {}", e);
            return Ok(());
        }
    };
    match msg {
        DealerMessage::ConnectionHandshake { .. } => Err(ConnectError::ProtocolViolation(
            "handshake on an established connection".into(),
        )),
        DealerMessage::Notification { uri, payload, .. } => {
            handle_notification(shared, epoch, &uri, &payload);
            Ok(())
        }
        DealerMessage::Request { key, uri, payload, .. } => {
            handle_request(shared, &uri, &payload).await;
            out_tx
                .send(Outbound::Text(reply_frame(&key, true)))
                .await
                .map_err(|_| ConnectError::Transport("writer closed".into()))
        }
        DealerMessage::Pong => {
            debug!("dealer pong");
            Ok(())
        }
    }
}

fn handle_notification(shared: &Shared, epoch: u64, uri: &str, payload: &[u8]) {
    match classify_notification(uri, shared.config.user_id.as_deref()) {
        NotificationKind::ClusterUpdate => match ClusterUpdate::decode(payload) {
            Ok(ClusterUpdate {
                cluster: Some(cluster),
                ..
            }) => shared.publish(cluster_to_state(&cluster, &shared.config.device_id), epoch),
            Ok(_) => debug!("cluster update without cluster"),
            Err(e) => warn!("bad cluster update: {}", e),
        },
        NotificationKind::Collection => match decode_collection(payload) {
            Ok(changes) => {
                debug!(count = changes.len(), "library changed");
                for change in changes {
                    let _ = shared.library_tx.send(change);
                }
            }
            Err(e) => warn!("bad collection update {}: {}", uri, e),
        },
        NotificationKind::Rootlist => {
            debug!("rootlist changed");
            let _ = shared.rootlist_tx.send(RootlistChanged);
        }
        NotificationKind::Other => debug!("ignoring notification {}", uri),
    }
}

/// Translate and deliver one request.  Failures are logged; the caller
/// replies regardless.
async fn handle_request(shared: &Arc<Shared>, uri: &str, payload: &[u8]) {
    let request = match CommandRequest::decode(payload) {
        Ok(r) => r,
        Err(e) => {
            warn!("bad request on {}: {}", uri, e);
            return;
        }
    };
    debug!(
        message_id = request.message_id,
        from = ?request.sent_by_device_id,
        endpoint = ?request.endpoint,
        "dealer request"
    );
    match request.to_event() {
        Ok(Some(event)) => {
            events::forward(shared.deps.events.as_ref(), event).await;
            if request.endpoint == Endpoint::Transfer {
                if let Err(e) = shared.takeover().await {
                    warn!("transfer without takeover: {}", e);
                }
            }
        }
        Ok(None) => debug!(endpoint = ?request.endpoint, "ignoring unknown endpoint"),
        Err(e) => warn!("malformed {:?} command: {}", request.endpoint, e),
    }
}

// ── background tasks ──────────────────────────────────────────────────────────

async fn writer_task(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::Receiver<Outbound>,
    conn: CancellationToken,
) {
    while let Some(out) = rx.recv().await {
        match out {
            Outbound::Text(text) => {
                debug!("dealer writer: send {}", text);
                if let Err(e) = sink.send(text).await {
                    warn!("dealer writer: write error: {}", e);
                    conn.cancel();
                    break;
                }
            }
            Outbound::Close(reason, detail) => {
                debug!(?reason, "dealer writer: closing ({})", detail);
                if let Err(e) = sink.close(reason, detail).await {
                    debug!("dealer writer: close error: {}", e);
                }
                break;
            }
        }
    }
    debug!("dealer writer: task exiting");
}

async fn keepalive_task(
    out_tx: mpsc::Sender<Outbound>,
    interval: Duration,
    conn: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = conn.cancelled() => break,
            _ = ticker.tick() => {
                if out_tx.send(Outbound::Text(ping_frame())).await.is_err() {
                    conn.cancel();
                    break;
                }
            }
        }
    }
    debug!("dealer keep-alive: task exiting");
}
