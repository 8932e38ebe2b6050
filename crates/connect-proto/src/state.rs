//! Remote playback state and the cluster reducer.
//!
//! [`RemoteState`] is an immutable snapshot: the session replaces it
//! wholesale on each cluster update and never mutates a published value.
//! Position is not stored directly; each snapshot keeps the anchor
//! `(position_as_of_ms, timestamp_ms, is_paused)` and [`RemoteState::position_at`]
//! extrapolates from it.

use serde::Serialize;
use std::time::Duration;

use crate::cluster::{
    Capabilities, Cluster, ContextPlayerOptions, Device, DeviceInfo, MemberType, PlayerState,
    ProvidedTrack, PutStateReason, PutStateRequest,
};
use crate::command::{PlayRequest, QueuedTrack};
use crate::config::DeviceConfig;
use crate::id::SpotifyId;
use crate::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatState {
    #[default]
    None,
    Context,
    Track,
}

impl RepeatState {
    pub fn from_options(options: Option<&ContextPlayerOptions>) -> Self {
        match options {
            Some(o) if o.repeating_track => Self::Track,
            Some(o) if o.repeating_context => Self::Context,
            _ => Self::None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" | "off" => Some(Self::None),
            "context" => Some(Self::Context),
            "track" => Some(Self::Track),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RemoteState {
    pub active_device_id: Option<String>,
    /// True when the active device is this one.
    pub is_local_active: bool,
    pub track_uri: Option<SpotifyId>,
    pub track_uid: Option<String>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_buffering: bool,
    pub is_shuffling: bool,
    pub repeat_state: RepeatState,
    pub context_uri: Option<SpotifyId>,
    pub track_index: Option<u32>,
    pub next_tracks: Vec<QueuedTrack>,
    pub position_as_of_ms: i64,
    pub timestamp_ms: i64,
    pub has_player_state: bool,
    /// Increments on every snapshot the session publishes.
    pub rev: u64,
    /// Connection attempt this snapshot was observed on.
    pub epoch: u64,
}

impl RemoteState {
    /// Position extrapolated to `now_ms` (unix millis).
    pub fn position_at(&self, now_ms: i64) -> Duration {
        if !self.has_player_state {
            return Duration::ZERO;
        }
        let ms = if self.is_paused {
            self.position_as_of_ms
        } else {
            self.position_as_of_ms
                .saturating_add(now_ms.saturating_sub(self.timestamp_ms))
        };
        Duration::from_millis(ms.max(0) as u64)
    }

    pub fn position(&self) -> Duration {
        self.position_at(platform::now_millis())
    }

    /// Tracks the user explicitly queued, in play order.
    pub fn queued_tracks(&self) -> Vec<QueuedTrack> {
        self.next_tracks
            .iter()
            .filter(|t| t.is_user_queued())
            .cloned()
            .collect()
    }

    /// `Play` request that resumes this state on the local device, or
    /// `None` when no track is current.
    pub fn takeover_request(&self, now_ms: i64) -> Option<PlayRequest> {
        let track = self.track_uri.clone()?;
        let context_uri = self
            .context_uri
            .as_ref()
            .map(SpotifyId::uri)
            .unwrap_or_else(|| track.uri());
        Some(PlayRequest {
            context_uri,
            track_uri: Some(track),
            track_uid: self.track_uid.clone(),
            track_index: self.track_index,
            position: Some(self.position_at(now_ms)),
            paused: self.is_paused,
            shuffling: Some(self.is_shuffling),
            repeat: Some(self.repeat_state),
            queue: self.queued_tracks(),
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn queued_track(track: &ProvidedTrack) -> QueuedTrack {
    QueuedTrack {
        uri: track.uri.clone(),
        uid: non_empty(&track.uid),
        provider: track.provider.clone(),
        metadata: track
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

/// Reduce a backend cluster snapshot to a [`RemoteState`].  `rev` and
/// `epoch` are left at zero for the session to stamp.
pub fn cluster_to_state(cluster: &Cluster, local_device_id: &str) -> RemoteState {
    let active_device_id = non_empty(&cluster.active_device_id);
    let is_local_active = active_device_id.as_deref() == Some(local_device_id);

    let Some(ps) = cluster.player_state.as_ref() else {
        return RemoteState {
            active_device_id,
            is_local_active,
            ..RemoteState::default()
        };
    };

    let track = ps.track.as_ref();
    let timestamp_ms = if ps.timestamp != 0 {
        ps.timestamp
    } else {
        cluster.timestamp
    };

    RemoteState {
        active_device_id,
        is_local_active,
        track_uri: SpotifyId::parse_opt(track.map(|t| t.uri.as_str())),
        track_uid: track.and_then(|t| non_empty(&t.uid)),
        is_playing: ps.is_playing && !ps.is_paused,
        is_paused: ps.is_paused,
        is_buffering: ps.is_buffering,
        is_shuffling: ps.options.as_ref().is_some_and(|o| o.shuffling_context),
        repeat_state: RepeatState::from_options(ps.options.as_ref()),
        context_uri: SpotifyId::parse_opt(Some(ps.context_uri.as_str())),
        track_index: ps.index.as_ref().map(|i| i.track),
        next_tracks: ps.next_tracks.iter().map(queued_track).collect(),
        position_as_of_ms: ps.position_as_of_timestamp,
        timestamp_ms,
        has_player_state: true,
        rev: 0,
        epoch: 0,
    }
}

fn capabilities(device: &DeviceConfig) -> Capabilities {
    Capabilities {
        can_be_player: true,
        is_controllable: true,
        volume_steps: device.volume_steps,
        command_acks: true,
        supports_transfer_command: true,
        supports_command_request: true,
        supports_gzip_pushes: true,
        is_observable: true,
        supported_types: vec!["audio/track".to_string(), "audio/episode".to_string()],
        ..Capabilities::default()
    }
}

/// `DeviceInfo` announced for this device.
pub fn device_info(device: &DeviceConfig, device_id: &str) -> DeviceInfo {
    DeviceInfo {
        can_play: true,
        volume: 65535,
        name: device.name.clone(),
        capabilities: Some(capabilities(device)),
        device_software_version: concat!("connectd/", env!("CARGO_PKG_VERSION")).to_string(),
        device_type: device.device_type.proto_value(),
        device_id: device_id.to_string(),
        ..DeviceInfo::default()
    }
}

fn put_state(
    device: &DeviceConfig,
    device_id: &str,
    player_state: PlayerState,
    reason: PutStateReason,
    now_ms: i64,
) -> PutStateRequest {
    PutStateRequest {
        device: Some(Device {
            device_info: Some(device_info(device, device_id)),
            player_state: Some(player_state),
        }),
        member_type: MemberType::ConnectState as i32,
        put_state_reason: reason as i32,
        client_side_timestamp: now_ms.max(0) as u64,
        ..PutStateRequest::default()
    }
}

/// Announcement sent right after the handshake, with an empty player state.
pub fn new_device_request(device: &DeviceConfig, device_id: &str, now_ms: i64) -> PutStateRequest {
    let player_state = PlayerState {
        timestamp: now_ms,
        playback_speed: 1.0,
        options: Some(ContextPlayerOptions::default()),
        ..PlayerState::default()
    };
    put_state(device, device_id, player_state, PutStateReason::NewDevice, now_ms)
}

/// Local player state update.
pub fn player_state_request(
    device: &DeviceConfig,
    device_id: &str,
    player_state: PlayerState,
    now_ms: i64,
) -> PutStateRequest {
    let mut req = put_state(
        device,
        device_id,
        player_state,
        PutStateReason::PlayerStateChanged,
        now_ms,
    );
    req.is_active = true;
    req
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ContextIndex;
    use std::collections::HashMap;

    const T0: i64 = 1_700_000_000_000;

    fn playing_cluster(is_paused: bool) -> Cluster {
        Cluster {
            timestamp: T0,
            active_device_id: "dev1".into(),
            player_state: Some(PlayerState {
                timestamp: T0,
                context_uri: "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M".into(),
                track: Some(ProvidedTrack {
                    uri: "spotify:track:4uLU6hMCjMI75M1A2tKUQC".into(),
                    uid: "uid-1".into(),
                    ..ProvidedTrack::default()
                }),
                index: Some(ContextIndex { page: 0, track: 7 }),
                position_as_of_timestamp: 10_000,
                is_playing: !is_paused,
                is_paused,
                options: Some(ContextPlayerOptions {
                    shuffling_context: true,
                    repeating_context: true,
                    repeating_track: false,
                }),
                next_tracks: vec![
                    ProvidedTrack {
                        uri: "spotify:track:a".into(),
                        provider: "queue".into(),
                        metadata: HashMap::from([("is_queued".into(), "true".into())]),
                        ..ProvidedTrack::default()
                    },
                    ProvidedTrack {
                        uri: "spotify:track:b".into(),
                        provider: "context".into(),
                        ..ProvidedTrack::default()
                    },
                ],
                ..PlayerState::default()
            }),
            ..Cluster::default()
        }
    }

    #[test]
    fn test_extrapolates_while_playing() {
        let state = cluster_to_state(&playing_cluster(false), "local");
        assert_eq!(state.active_device_id.as_deref(), Some("dev1"));
        assert_eq!(state.position_at(T0 + 2000), Duration::from_millis(12_000));
    }

    #[test]
    fn test_paused_position_is_verbatim() {
        let state = cluster_to_state(&playing_cluster(true), "local");
        assert!(state.is_paused);
        assert!(!state.is_playing);
        assert_eq!(state.position_at(T0 + 60_000), Duration::from_millis(10_000));
    }

    #[test]
    fn test_position_floored_at_zero() {
        let state = cluster_to_state(&playing_cluster(false), "local");
        assert_eq!(state.position_at(T0 - 60_000), Duration::ZERO);
    }

    #[test]
    fn test_missing_player_state() {
        let cluster = Cluster {
            active_device_id: "dev1".into(),
            ..Cluster::default()
        };
        let state = cluster_to_state(&cluster, "dev1");
        assert!(state.is_local_active);
        assert!(!state.is_playing && !state.is_paused && !state.is_shuffling);
        assert_eq!(state.track_uri, None);
        assert_eq!(state.context_uri, None);
        assert_eq!(state.position_at(T0), Duration::ZERO);
    }

    #[test]
    fn test_fields_and_options() {
        let state = cluster_to_state(&playing_cluster(false), "local");
        assert!(!state.is_local_active);
        assert_eq!(
            state.track_uri.as_ref().map(|id| id.uri()).as_deref(),
            Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(state.track_uid.as_deref(), Some("uid-1"));
        assert_eq!(state.track_index, Some(7));
        assert!(state.is_shuffling);
        assert_eq!(state.repeat_state, RepeatState::Context);
        assert_eq!(state.next_tracks.len(), 2);
        let queued = state.queued_tracks();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].uri, "spotify:track:a");
    }

    #[test]
    fn test_unparseable_ids_are_absent() {
        let mut cluster = playing_cluster(false);
        if let Some(ps) = cluster.player_state.as_mut() {
            ps.context_uri = "not a uri".into();
            if let Some(track) = ps.track.as_mut() {
                track.uri = String::new();
            }
        }
        let state = cluster_to_state(&cluster, "local");
        assert_eq!(state.context_uri, None);
        assert_eq!(state.track_uri, None);
    }

    #[test]
    fn test_playing_and_paused_never_both_true() {
        let mut cluster = playing_cluster(true);
        if let Some(ps) = cluster.player_state.as_mut() {
            ps.is_playing = true;
        }
        let state = cluster_to_state(&cluster, "local");
        assert!(state.is_paused);
        assert!(!state.is_playing);
    }

    #[test]
    fn test_repeat_track_wins() {
        let options = ContextPlayerOptions {
            repeating_context: true,
            repeating_track: true,
            ..ContextPlayerOptions::default()
        };
        assert_eq!(RepeatState::from_options(Some(&options)), RepeatState::Track);
        assert_eq!(RepeatState::from_options(None), RepeatState::None);
    }

    #[test]
    fn test_takeover_request() {
        let state = cluster_to_state(&playing_cluster(false), "local");
        let play = state.takeover_request(T0 + 500).unwrap();
        assert_eq!(play.context_uri, "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M");
        assert_eq!(play.track_uid.as_deref(), Some("uid-1"));
        assert_eq!(play.track_index, Some(7));
        assert_eq!(play.position, Some(Duration::from_millis(10_500)));
        assert!(!play.paused);
        assert_eq!(play.shuffling, Some(true));
        assert_eq!(play.repeat, Some(RepeatState::Context));
        assert_eq!(play.queue.len(), 1);

        assert_eq!(RemoteState::default().takeover_request(T0), None);
    }

    #[test]
    fn test_new_device_request() {
        let device = DeviceConfig::default();
        let req = new_device_request(&device, "abc", T0);
        assert_eq!(req.member_type, MemberType::ConnectState as i32);
        assert_eq!(req.put_state_reason, PutStateReason::NewDevice as i32);
        assert!(!req.is_active);
        let info = req
            .device
            .as_ref()
            .and_then(|d| d.device_info.as_ref())
            .unwrap();
        assert_eq!(info.device_id, "abc");
        assert_eq!(info.name, device.name);
        let caps = info.capabilities.as_ref().unwrap();
        assert!(caps.can_be_player && caps.supports_command_request);
        assert_eq!(caps.volume_steps, device.volume_steps);
    }
}
