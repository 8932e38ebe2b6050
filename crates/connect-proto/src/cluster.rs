//! Protobuf subset of the connect-state service.
//!
//! Only the fields this client reads or writes are declared; prost skips
//! unknown fields on decode, so the backend can add fields freely.  Tags
//! follow the service's `connect.proto` / `player.proto`.

use std::collections::HashMap;

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClusterUpdate {
    #[prost(message, optional, tag = "1")]
    pub cluster: Option<Cluster>,
    #[prost(int32, tag = "2")]
    pub update_reason: i32,
    #[prost(string, tag = "3")]
    pub ack_id: String,
    #[prost(string, repeated, tag = "4")]
    pub devices_that_changed: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Cluster {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub active_device_id: String,
    #[prost(message, optional, tag = "3")]
    pub player_state: Option<PlayerState>,
    #[prost(map = "string, message", tag = "4")]
    pub device: HashMap<String, DeviceInfo>,
    #[prost(int64, tag = "7")]
    pub not_playing_since_timestamp: i64,
    #[prost(bool, tag = "8")]
    pub need_full_player_state: bool,
    #[prost(int64, tag = "9")]
    pub server_timestamp_ms: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlayerState {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub context_uri: String,
    #[prost(string, tag = "3")]
    pub context_url: String,
    #[prost(message, optional, tag = "6")]
    pub index: Option<ContextIndex>,
    #[prost(message, optional, tag = "7")]
    pub track: Option<ProvidedTrack>,
    #[prost(string, tag = "8")]
    pub playback_id: String,
    #[prost(double, tag = "9")]
    pub playback_speed: f64,
    #[prost(int64, tag = "10")]
    pub position_as_of_timestamp: i64,
    #[prost(int64, tag = "11")]
    pub duration: i64,
    #[prost(bool, tag = "12")]
    pub is_playing: bool,
    #[prost(bool, tag = "13")]
    pub is_paused: bool,
    #[prost(bool, tag = "14")]
    pub is_buffering: bool,
    #[prost(bool, tag = "15")]
    pub is_system_initiated: bool,
    #[prost(message, optional, tag = "16")]
    pub options: Option<ContextPlayerOptions>,
    #[prost(message, repeated, tag = "19")]
    pub prev_tracks: Vec<ProvidedTrack>,
    #[prost(message, repeated, tag = "20")]
    pub next_tracks: Vec<ProvidedTrack>,
    #[prost(map = "string, string", tag = "21")]
    pub context_metadata: HashMap<String, String>,
    #[prost(string, tag = "23")]
    pub session_id: String,
    #[prost(string, tag = "24")]
    pub queue_revision: String,
    #[prost(int64, tag = "25")]
    pub position: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ContextIndex {
    #[prost(uint32, tag = "1")]
    pub page: u32,
    #[prost(uint32, tag = "2")]
    pub track: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProvidedTrack {
    #[prost(string, tag = "1")]
    pub uri: String,
    #[prost(string, tag = "2")]
    pub uid: String,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "6")]
    pub provider: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ContextPlayerOptions {
    #[prost(bool, tag = "1")]
    pub shuffling_context: bool,
    #[prost(bool, tag = "2")]
    pub repeating_context: bool,
    #[prost(bool, tag = "3")]
    pub repeating_track: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PutStateRequest {
    #[prost(string, tag = "1")]
    pub callback_url: String,
    #[prost(message, optional, tag = "2")]
    pub device: Option<Device>,
    #[prost(enumeration = "MemberType", tag = "3")]
    pub member_type: i32,
    #[prost(bool, tag = "4")]
    pub is_active: bool,
    #[prost(enumeration = "PutStateReason", tag = "5")]
    pub put_state_reason: i32,
    #[prost(uint32, tag = "6")]
    pub message_id: u32,
    #[prost(string, tag = "7")]
    pub last_command_sent_by_device_id: String,
    #[prost(uint32, tag = "8")]
    pub last_command_message_id: u32,
    #[prost(uint64, tag = "9")]
    pub started_playing_at: u64,
    #[prost(uint64, tag = "11")]
    pub has_been_playing_for_ms: u64,
    #[prost(uint64, tag = "12")]
    pub client_side_timestamp: u64,
    #[prost(bool, tag = "13")]
    pub only_write_player_state: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Device {
    #[prost(message, optional, tag = "1")]
    pub device_info: Option<DeviceInfo>,
    #[prost(message, optional, tag = "2")]
    pub player_state: Option<PlayerState>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfo {
    #[prost(bool, tag = "1")]
    pub can_play: bool,
    #[prost(uint32, tag = "2")]
    pub volume: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(message, optional, tag = "4")]
    pub capabilities: Option<Capabilities>,
    #[prost(string, tag = "6")]
    pub device_software_version: String,
    #[prost(int32, tag = "7")]
    pub device_type: i32,
    #[prost(string, tag = "9")]
    pub spirc_version: String,
    #[prost(string, tag = "10")]
    pub device_id: String,
    #[prost(bool, tag = "11")]
    pub is_private_session: bool,
    #[prost(string, tag = "13")]
    pub client_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Capabilities {
    #[prost(bool, tag = "2")]
    pub can_be_player: bool,
    #[prost(bool, tag = "3")]
    pub restrict_to_local: bool,
    #[prost(bool, tag = "5")]
    pub gaia_eq_connect_id: bool,
    #[prost(bool, tag = "6")]
    pub supports_logout: bool,
    #[prost(bool, tag = "7")]
    pub is_observable: bool,
    #[prost(int32, tag = "8")]
    pub volume_steps: i32,
    #[prost(string, repeated, tag = "9")]
    pub supported_types: Vec<String>,
    #[prost(bool, tag = "10")]
    pub command_acks: bool,
    #[prost(bool, tag = "15")]
    pub supports_playlist_v2: bool,
    #[prost(bool, tag = "16")]
    pub is_controllable: bool,
    #[prost(bool, tag = "19")]
    pub supports_transfer_command: bool,
    #[prost(bool, tag = "20")]
    pub supports_command_request: bool,
    #[prost(bool, tag = "23")]
    pub supports_gzip_pushes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PutStateReason {
    UnknownPutStateReason = 0,
    SpircHello = 1,
    SpircNotify = 2,
    NewDevice = 3,
    PlayerStateChanged = 4,
    VolumeChanged = 5,
    PickerOpened = 6,
    BecameInactive = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MemberType {
    SpircV2 = 0,
    SpircV3 = 1,
    ConnectState = 2,
    ConnectStateExtended = 5,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_cluster_update_carries_device_map() {
        let mut cluster = Cluster {
            active_device_id: "phone".into(),
            ..Cluster::default()
        };
        cluster.device.insert(
            "phone".into(),
            DeviceInfo {
                name: "Pixel".into(),
                device_id: "phone".into(),
                volume: 32768,
                ..DeviceInfo::default()
            },
        );
        let bytes = ClusterUpdate {
            cluster: Some(cluster),
            ..ClusterUpdate::default()
        }
        .encode_to_vec();

        let decoded = ClusterUpdate::decode(bytes.as_slice()).unwrap();
        let cluster = decoded.cluster.unwrap();
        assert_eq!(cluster.device["phone"].name, "Pixel");
        assert_eq!(cluster.device["phone"].volume, 32768);
    }
}
