use base64::Engine;
use connect_proto::cluster::{Cluster, ClusterUpdate, PlayerState, ProvidedTrack};
use connect_proto::protocol::gzip;
use prost::Message;
use serde_json::{json, Value};

pub fn handshake(connection_id: &str) -> String {
    json!({
        "type": "message",
        "uri": format!("hm://pusher/v1/connections/{}", connection_id),
        "headers": { "Spotify-Connection-Id": connection_id },
    })
    .to_string()
}

pub fn cluster(active_device: &str, track_uri: &str) -> Cluster {
    Cluster {
        active_device_id: active_device.to_string(),
        player_state: Some(PlayerState {
            timestamp: 1_700_000_000_000,
            context_uri: "spotify:album:4aawyAB9vmqN3uQ7FjRGTy".into(),
            track: Some(ProvidedTrack {
                uri: track_uri.to_string(),
                uid: "uid-1".into(),
                ..ProvidedTrack::default()
            }),
            is_playing: true,
            ..PlayerState::default()
        }),
        ..Cluster::default()
    }
}

pub fn cluster_update(cluster: Cluster) -> String {
    let update = ClusterUpdate {
        cluster: Some(cluster),
        ..ClusterUpdate::default()
    };
    let payload = base64::engine::general_purpose::STANDARD.encode(update.encode_to_vec());
    json!({
        "type": "message",
        "uri": "hm://connect-state/v1/cluster",
        "headers": { "Content-Type": "application/x-protobuf" },
        "payloads": [payload],
    })
    .to_string()
}

pub fn request(key: &str, command: Value) -> String {
    let body = json!({
        "message_id": 7,
        "sent_by_device_id": "phone",
        "command": command,
    });
    let compressed = gzip(body.to_string().as_bytes()).expect("gzip in memory");
    json!({
        "type": "request",
        "key": key,
        "message_ident": "hm://connect-state/v1/player/command",
        "payload": { "compressed": base64::engine::general_purpose::STANDARD.encode(compressed) },
    })
    .to_string()
}

pub fn collection(items: Value) -> String {
    json!({
        "type": "message",
        "uri": "hm://collection/collection/alice/json",
        "payloads": [json!([{ "items": items }]).to_string()],
    })
    .to_string()
}

pub fn rootlist(user: &str) -> String {
    json!({
        "type": "message",
        "uri": format!("hm://playlist/v2/user/{}/rootlist", user),
        "payloads": [],
    })
    .to_string()
}
