use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use connect_proto::error::{ConnectError, ConnectResult};
use connect_proto::state::{RemoteState, RepeatState};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::session::SessionHandle;

#[derive(Clone)]
struct HttpState {
    session: SessionHandle,
}

#[derive(Serialize)]
struct ApiState {
    device_id: String,
    connected: bool,
    position_ms: u64,
    #[serde(flatten)]
    remote: RemoteState,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

type ApiResult = Result<StatusCode, (StatusCode, Json<ApiError>)>;

pub fn router(session: SessionHandle) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/command/:endpoint", post(command))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/next", post(next))
        .route("/api/prev", post(prev))
        .route("/api/takeover", post(takeover))
        .route("/api/seek/:ms", post(seek))
        .route("/api/shuffle/:on", post(shuffle))
        .route("/api/repeat/:mode", post(repeat))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { session })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    session: SessionHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(session);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn reply(result: ConnectResult<()>) -> ApiResult {
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            let status = status_for(&e);
            warn!("HTTP API: command failed: {}", e);
            Err((status, Json(ApiError { error: e.to_string() })))
        }
    }
}

fn bad_request(message: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message }))
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    let remote = state.session.state();
    Json(ApiState {
        device_id: state.session.device_id().to_string(),
        connected: state.session.is_ready().await,
        position_ms: remote.position().as_millis() as u64,
        remote: RemoteState::clone(&remote),
    })
}

async fn command(
    State(state): State<HttpState>,
    Path(endpoint): Path<String>,
    body: Option<Json<Value>>,
) -> ApiResult {
    let params = match body.map(|Json(v)| v) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(bad_request("body must be a JSON object".into())),
    };
    info!("HTTP API: command {}", endpoint);
    reply(state.session.send_command(&endpoint, params).await)
}

async fn pause(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Pause");
    reply(state.session.pause().await)
}

async fn resume(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Resume");
    reply(state.session.resume().await)
}

async fn next(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Next");
    reply(state.session.skip_next().await)
}

async fn prev(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Previous");
    reply(state.session.skip_previous().await)
}

async fn takeover(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Takeover");
    reply(state.session.takeover().await)
}

async fn seek(State(state): State<HttpState>, Path(ms): Path<u64>) -> ApiResult {
    info!("HTTP API: Seek to {}ms", ms);
    reply(state.session.seek_to(Duration::from_millis(ms)).await)
}

async fn shuffle(State(state): State<HttpState>, Path(on): Path<String>) -> ApiResult {
    let shuffling = match on.as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => return Err(bad_request(format!("invalid shuffle value `{}`", other))),
    };
    info!("HTTP API: Shuffle {}", shuffling);
    reply(state.session.set_shuffle(shuffling).await)
}

async fn repeat(State(state): State<HttpState>, Path(mode): Path<String>) -> ApiResult {
    let Some(repeat) = RepeatState::parse(&mode) else {
        return Err(bad_request(format!("invalid repeat mode `{}`", mode)));
    };
    info!("HTTP API: Repeat {:?}", repeat);
    reply(state.session.set_repeat(repeat).await)
}

fn status_for(err: &ConnectError) -> StatusCode {
    if err.is_precondition() {
        StatusCode::CONFLICT
    } else {
        StatusCode::BAD_GATEWAY
    }
}
