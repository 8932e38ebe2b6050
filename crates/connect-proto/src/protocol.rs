//! Dealer websocket framing.
//!
//! Every inbound text frame is a JSON object tagged by `type`:
//!
//! ```text
//!   {"type":"message", "uri":..., "headers":{...}, "payloads":[...]}
//!   {"type":"request", "key":..., "message_ident":..., "headers":{...}, "payload":{"compressed":"<b64 gzip>"}}
//!   {"type":"pong"}
//! ```
//!
//! The framer turns those into [`DealerMessage`] values with the payload
//! already base64-decoded and gunzipped.  It knows nothing about what the
//! payload means; that is the session's job.

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::DecodeError;

pub const CONNECTION_ID_HEADER: &str = "Spotify-Connection-Id";
pub const HANDSHAKE_URI_PREFIX: &str = "hm://pusher/v1/connections/";
pub const CLUSTER_URI_PREFIX: &str = "hm://connect-state/v1/cluster";
pub const COLLECTION_URI_PREFIX: &str = "hm://collection/";
pub const COLLECTION_URI_SUFFIX: &str = "/json";
const ROOTLIST_URI_PREFIX: &str = "hm://playlist/v2/user/";
const ROOTLIST_URI_SUFFIX: &str = "/rootlist";

/// Case-sensitive header map.  Iteration order is by key.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum DealerMessage {
    /// First frame on every connection; carries the connection id header.
    ConnectionHandshake { uri: String, headers: Headers },
    /// Unsolicited push.
    Notification {
        uri: String,
        headers: Headers,
        payload: Vec<u8>,
    },
    /// Command that expects a reply correlated by `key`.
    Request {
        key: String,
        uri: String,
        headers: Headers,
        payload: Vec<u8>,
    },
    /// Answer to our keep-alive ping.
    Pong,
}

impl DealerMessage {
    /// The non-empty connection id of a handshake, if any.
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            DealerMessage::ConnectionHandshake { headers, .. } => headers
                .get(CONNECTION_ID_HEADER)
                .map(|s| s.as_str())
                .filter(|s| !s.trim().is_empty()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DealerMessage::ConnectionHandshake { .. } => "handshake",
            DealerMessage::Notification { .. } => "notification",
            DealerMessage::Request { .. } => "request",
            DealerMessage::Pong => "pong",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    message_ident: Option<String>,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    payloads: Vec<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Parse one inbound text frame.
pub fn parse_frame(text: &str) -> Result<DealerMessage, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    match raw.kind.as_str() {
        "message" => {
            let uri = raw.uri.ok_or(DecodeError::MissingField("uri"))?;
            if uri.starts_with(HANDSHAKE_URI_PREFIX) || raw.headers.contains_key(CONNECTION_ID_HEADER)
            {
                return Ok(DealerMessage::ConnectionHandshake {
                    uri,
                    headers: raw.headers,
                });
            }
            let payload = decode_message_payloads(&raw.payloads, &raw.headers)?;
            Ok(DealerMessage::Notification {
                uri,
                headers: raw.headers,
                payload,
            })
        }
        "request" => {
            let uri = raw
                .message_ident
                .or(raw.uri)
                .ok_or(DecodeError::MissingField("message_ident"))?;
            let key = raw.key.unwrap_or_else(|| uri.clone());
            let payload = match raw.payload {
                Some(value) => decode_request_payload(&value)?,
                None => Vec::new(),
            };
            Ok(DealerMessage::Request {
                key,
                uri,
                headers: raw.headers,
                payload,
            })
        }
        "pong" | "ping" => Ok(DealerMessage::Pong),
        other => Err(DecodeError::Unexpected(format!("frame type `{}`", other))),
    }
}

fn decode_message_payloads(payloads: &[Value], headers: &Headers) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::new();
    for value in payloads {
        match value {
            Value::String(s) => match base64::engine::general_purpose::STANDARD.decode(s) {
                Ok(decoded) => bytes.extend_from_slice(&decoded),
                // Some pushes (collection deltas) carry plain JSON text
                Err(_) => bytes.extend_from_slice(s.as_bytes()),
            },
            Value::Null => {}
            other => bytes.extend_from_slice(&serde_json::to_vec(other)?),
        }
    }

    let gzipped = headers
        .get("Transfer-Encoding")
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);
    if gzipped && !bytes.is_empty() {
        return Ok(gunzip(&bytes)?);
    }
    Ok(bytes)
}

fn decode_request_payload(value: &Value) -> Result<Vec<u8>, DecodeError> {
    if let Some(compressed) = value.get("compressed").and_then(Value::as_str) {
        let raw = base64::engine::general_purpose::STANDARD.decode(compressed)?;
        return Ok(gunzip(&raw)?);
    }
    Ok(serde_json::to_vec(value)?)
}

/// What a notification URI refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ClusterUpdate,
    Rootlist,
    Collection,
    Other,
}

/// Route a notification URI.  When `user_id` is known the rootlist URI must
/// match it exactly; otherwise any user's rootlist path is accepted.
pub fn classify_notification(uri: &str, user_id: Option<&str>) -> NotificationKind {
    if uri.starts_with(CLUSTER_URI_PREFIX) {
        return NotificationKind::ClusterUpdate;
    }
    if uri.starts_with(COLLECTION_URI_PREFIX) && uri.ends_with(COLLECTION_URI_SUFFIX) {
        return NotificationKind::Collection;
    }
    let is_rootlist = match user_id {
        Some(user) => uri == rootlist_uri(user),
        None => uri.starts_with(ROOTLIST_URI_PREFIX) && uri.ends_with(ROOTLIST_URI_SUFFIX),
    };
    if is_rootlist {
        NotificationKind::Rootlist
    } else {
        NotificationKind::Other
    }
}

pub fn rootlist_uri(user_id: &str) -> String {
    format!("{}{}{}", ROOTLIST_URI_PREFIX, user_id, ROOTLIST_URI_SUFFIX)
}

// ── outbound frames ───────────────────────────────────────────────────────────

pub fn ping_frame() -> String {
    json!({ "type": "ping" }).to_string()
}

pub fn reply_frame(key: &str, success: bool) -> String {
    json!({
        "type": "reply",
        "key": key,
        "payload": { "success": success.to_string() },
    })
    .to_string()
}

pub fn dealer_url(base: &str, access_token: &str) -> String {
    format!("{}?access_token={}", base.trim_end_matches('/'), access_token)
}

// ── gzip ──────────────────────────────────────────────────────────────────────

pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
