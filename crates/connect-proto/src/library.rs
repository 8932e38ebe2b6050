//! Library (collection) and rootlist change notifications.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::DecodeError;
use crate::id::SpotifyId;

/// One saved/unsaved library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryChanged {
    pub item: SpotifyId,
    pub removed: bool,
    pub added_at: Option<DateTime<Utc>>,
}

/// The user's playlist rootlist changed; consumers refetch it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootlistChanged;

#[derive(Deserialize)]
struct CollectionUpdate {
    #[serde(default)]
    items: Vec<CollectionItem>,
}

#[derive(Deserialize)]
struct CollectionItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    removed: bool,
    #[serde(default, rename = "addedAt")]
    added_at: i64,
    identifier: String,
}

/// Decode a `hm://collection/.../json` payload.
///
/// Accepts either an array of update objects or a single one.  Items of
/// kinds other than track/artist/album, or with malformed identifiers, are
/// skipped.
pub fn decode_collection(payload: &[u8]) -> Result<Vec<LibraryChanged>, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let updates: Vec<CollectionUpdate> = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(_) => vec![serde_json::from_value(value)?],
        other => {
            return Err(DecodeError::Unexpected(format!(
                "collection payload is not an object: {}",
                other
            )))
        }
    };

    let mut changes = Vec::new();
    for item in updates.into_iter().flat_map(|u| u.items) {
        if !matches!(item.kind.as_str(), "track" | "artist" | "album") {
            debug!(kind = %item.kind, "skipping collection item");
            continue;
        }
        let Some(id) = SpotifyId::from_base62(&item.kind, &item.identifier) else {
            debug!(identifier = %item.identifier, "skipping malformed collection identifier");
            continue;
        };
        let added_at = (!item.removed && item.added_at > 0)
            .then(|| Utc.timestamp_opt(item.added_at, 0).single())
            .flatten();
        changes.push(LibraryChanged {
            item: id,
            removed: item.removed,
            added_at,
        });
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ItemKind;

    #[test]
    fn test_decode_array() {
        let payload = br#"[{"items":[
            {"type":"track","removed":false,"addedAt":1700000000,"identifier":"4uLU6hMCjMI75M1A2tKUQC"},
            {"type":"album","removed":true,"addedAt":0,"identifier":"4aawyAB9vmqN3uQ7FjRGTy"}
        ]}]"#;
        let changes = decode_collection(payload).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].item.kind, ItemKind::Track);
        assert!(!changes[0].removed);
        assert_eq!(changes[0].added_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(changes[1].item.kind, ItemKind::Album);
        assert!(changes[1].removed);
        assert_eq!(changes[1].added_at, None);
    }

    #[test]
    fn test_decode_single_object() {
        let payload =
            br#"{"items":[{"type":"artist","removed":false,"addedAt":1,"identifier":"0OdUWJ0sBjDrqHygGUXeCF"}]}"#;
        let changes = decode_collection(payload).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].item.uri(), "spotify:artist:0OdUWJ0sBjDrqHygGUXeCF");
    }

    #[test]
    fn test_skips_unknown_kinds_and_bad_ids() {
        let payload = br#"[{"items":[
            {"type":"show","removed":false,"addedAt":1,"identifier":"4uLU6hMCjMI75M1A2tKUQC"},
            {"type":"track","removed":false,"addedAt":1,"identifier":"short"}
        ]}]"#;
        assert!(decode_collection(payload).unwrap().is_empty());
    }

    #[test]
    fn test_removed_item_has_no_added_at() {
        let payload = br#"[{"items":[
            {"type":"track","removed":true,"addedAt":1700000000,"identifier":"4uLU6hMCjMI75M1A2tKUQC"}
        ]}]"#;
        let changes = decode_collection(payload).unwrap();
        assert!(changes[0].removed);
        assert_eq!(changes[0].added_at, None);
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(decode_collection(b"not json").is_err());
        assert!(decode_collection(b"42").is_err());
    }
}
