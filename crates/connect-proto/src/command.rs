//! Player commands in both directions.
//!
//! Inbound: the dealer delivers `request` frames whose body names an
//! `endpoint`.  [`Endpoint::parse`] is the single mapping table from endpoint
//! names to behaviour; [`CommandRequest::to_event`] turns a request into the
//! [`PlaybackEvent`] handed to the local playback engine.
//!
//! Outbound: [`command_envelope`] builds the JSON body POSTed to the player
//! command endpoint for the currently active device.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::DecodeError;
use crate::id::SpotifyId;
use crate::state::RepeatState;

/// A track as carried by queue commands and the cluster's `next_tracks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTrack {
    pub uri: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl QueuedTrack {
    pub fn is_user_queued(&self) -> bool {
        self.provider == "queue"
    }

    fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let uri = value
            .get("uri")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("track.uri"))?
            .to_string();
        let uid = value
            .get("uid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let provider = value
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = value
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            uri,
            uid,
            provider,
            metadata,
        })
    }
}

/// Everything needed to start playback of a context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayRequest {
    pub context_uri: String,
    pub track_uri: Option<SpotifyId>,
    pub track_uid: Option<String>,
    pub track_index: Option<u32>,
    pub position: Option<Duration>,
    pub paused: bool,
    pub shuffling: Option<bool>,
    pub repeat: Option<RepeatState>,
    pub queue: Vec<QueuedTrack>,
}

/// Instruction for the local playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Play(PlayRequest),
    Pause,
    Resume,
    SeekTo(Duration),
    SkipNext,
    SetQueue(Vec<QueuedTrack>),
    AddToQueue(QueuedTrack),
    SetShuffle(bool),
    SetRepeat(RepeatState),
    TransferDevice,
}

impl PlaybackEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Play(_) => "play",
            PlaybackEvent::Pause => "pause",
            PlaybackEvent::Resume => "resume",
            PlaybackEvent::SeekTo(_) => "seek_to",
            PlaybackEvent::SkipNext => "skip_next",
            PlaybackEvent::SetQueue(_) => "set_queue",
            PlaybackEvent::AddToQueue(_) => "add_to_queue",
            PlaybackEvent::SetShuffle(_) => "set_shuffle",
            PlaybackEvent::SetRepeat(_) => "set_repeat",
            PlaybackEvent::TransferDevice => "transfer",
        }
    }
}

/// Inbound endpoint names understood by this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Play,
    Pause,
    Resume,
    SeekTo,
    SkipNext,
    SetQueue,
    AddToQueue,
    SetRepeatingTrack,
    SetRepeatingContext,
    SetShufflingContext,
    Transfer,
    Unknown(String),
}

impl Endpoint {
    pub fn parse(name: &str) -> Self {
        match name {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "seek_to" => Self::SeekTo,
            "skip_next" => Self::SkipNext,
            "set_queue" => Self::SetQueue,
            "add_to_queue" => Self::AddToQueue,
            "set_repeating_track" => Self::SetRepeatingTrack,
            "set_repeating_context" => Self::SetRepeatingContext,
            "set_shuffling_context" => Self::SetShufflingContext,
            "transfer" => Self::Transfer,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Decoded body of a dealer `request` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub message_id: u32,
    pub sent_by_device_id: Option<String>,
    pub endpoint: Endpoint,
    /// The raw `command` object, endpoint included.
    pub command: Value,
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    message_id: u32,
    #[serde(default)]
    sent_by_device_id: Option<String>,
    command: Value,
}

impl CommandRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawRequest = serde_json::from_slice(payload)?;
        let endpoint = raw
            .command
            .get("endpoint")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("command.endpoint"))?;
        Ok(Self {
            message_id: raw.message_id,
            sent_by_device_id: raw.sent_by_device_id.filter(|s| !s.is_empty()),
            endpoint: Endpoint::parse(endpoint),
            command: raw.command,
        })
    }

    /// Translate into a playback event.  `Ok(None)` for unknown endpoints.
    pub fn to_event(&self) -> Result<Option<PlaybackEvent>, DecodeError> {
        let cmd = &self.command;
        let event = match &self.endpoint {
            Endpoint::Play => PlaybackEvent::Play(parse_play(cmd)?),
            Endpoint::Pause => PlaybackEvent::Pause,
            Endpoint::Resume => PlaybackEvent::Resume,
            Endpoint::SeekTo => {
                let ms = cmd
                    .get("value")
                    .and_then(Value::as_f64)
                    .ok_or(DecodeError::MissingField("value"))?;
                PlaybackEvent::SeekTo(millis(ms))
            }
            Endpoint::SkipNext => PlaybackEvent::SkipNext,
            Endpoint::SetQueue => {
                let tracks = cmd
                    .get("next_tracks")
                    .and_then(Value::as_array)
                    .ok_or(DecodeError::MissingField("next_tracks"))?
                    .iter()
                    .map(QueuedTrack::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                PlaybackEvent::SetQueue(tracks)
            }
            Endpoint::AddToQueue => {
                let track = cmd.get("track").ok_or(DecodeError::MissingField("track"))?;
                PlaybackEvent::AddToQueue(QueuedTrack::from_json(track)?)
            }
            Endpoint::SetRepeatingTrack => PlaybackEvent::SetRepeat(if bool_value(cmd)? {
                RepeatState::Track
            } else {
                RepeatState::None
            }),
            Endpoint::SetRepeatingContext => PlaybackEvent::SetRepeat(if bool_value(cmd)? {
                RepeatState::Context
            } else {
                RepeatState::None
            }),
            Endpoint::SetShufflingContext => PlaybackEvent::SetShuffle(bool_value(cmd)?),
            Endpoint::Transfer => PlaybackEvent::TransferDevice,
            Endpoint::Unknown(_) => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn bool_value(cmd: &Value) -> Result<bool, DecodeError> {
    cmd.get("value")
        .and_then(Value::as_bool)
        .ok_or(DecodeError::MissingField("value"))
}

fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms as u64)
    } else {
        Duration::ZERO
    }
}

fn parse_play(cmd: &Value) -> Result<PlayRequest, DecodeError> {
    let context_uri = cmd
        .pointer("/context/uri")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("context.uri"))?
        .to_string();

    let options = cmd.get("options");
    let skip_to = options.and_then(|o| o.get("skip_to"));
    let str_field = |name: &str| {
        skip_to
            .and_then(|s| s.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    Ok(PlayRequest {
        context_uri,
        track_uri: SpotifyId::parse_opt(str_field("track_uri")),
        track_uid: str_field("track_uid").map(str::to_string),
        track_index: skip_to
            .and_then(|s| s.get("track_index"))
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok()),
        position: options
            .and_then(|o| o.get("seek_to"))
            .and_then(Value::as_f64)
            .map(millis),
        paused: options
            .and_then(|o| o.get("initially_paused"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        shuffling: None,
        repeat: None,
        queue: Vec::new(),
    })
}

// ── outbound ──────────────────────────────────────────────────────────────────

pub const CMD_PAUSE: &str = "pause";
pub const CMD_RESUME: &str = "resume";
pub const CMD_SKIP_NEXT: &str = "skip_next";
pub const CMD_SKIP_PREV: &str = "skip_prev";
pub const CMD_SEEK_TO: &str = "seek_to";
pub const CMD_SET_SHUFFLE: &str = "set_shuffling_context";
pub const CMD_SET_OPTIONS: &str = "set_options";

/// `{"command": {"endpoint": <name>, ...params}}`.  A caller-supplied
/// `endpoint` key never overrides `name`.
pub fn command_envelope(name: &str, params: Map<String, Value>) -> Value {
    let mut command = params;
    command.insert("endpoint".to_string(), Value::String(name.to_string()));
    let mut envelope = Map::new();
    envelope.insert("command".to_string(), Value::Object(command));
    Value::Object(envelope)
}

pub fn seek_params(position: Duration) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("value".into(), Value::from(position.as_millis() as u64));
    params
}

pub fn shuffle_params(shuffling: bool) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("value".into(), Value::Bool(shuffling));
    params
}

pub fn repeat_params(repeat: RepeatState) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(
        "repeating_context".into(),
        Value::Bool(matches!(repeat, RepeatState::Context | RepeatState::Track)),
    );
    params.insert(
        "repeating_track".into(),
        Value::Bool(repeat == RepeatState::Track),
    );
    params
}
