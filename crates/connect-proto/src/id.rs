//! Canonical identifiers for items referenced by the backend.
//!
//! The backend speaks in URIs (`spotify:track:4uLU6hMCjMI75M1A2tKUQC`).  Parsing
//! is deliberately lenient about *which* kinds exist but strict about the
//! shape of the ones we know; anything unparseable becomes `None`.

use serde::{Deserialize, Serialize};
use std::fmt;

const BASE62_LEN: usize = 22;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Track,
    Episode,
    Album,
    Artist,
    Playlist,
    Show,
    /// Any other kind (`station`, `collection`, `internal`, ...), kept verbatim.
    Other(String),
}

impl ItemKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "track" => Self::Track,
            "episode" => Self::Episode,
            "album" => Self::Album,
            "artist" => Self::Artist,
            "playlist" => Self::Playlist,
            "show" => Self::Show,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Track => "track",
            Self::Episode => "episode",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Show => "show",
            Self::Other(s) => s,
        }
    }

    fn is_base62_kind(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpotifyId {
    pub kind: ItemKind,
    /// Base62 id for known kinds; the raw URI remainder for `Other`.
    pub id: String,
}

impl SpotifyId {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            return None;
        }
        if kind.is_base62_kind() && !is_base62(&id) {
            return None;
        }
        Some(Self { kind, id })
    }

    /// Build from a bare base62 id plus a library item type
    /// (`track` / `artist` / `album`).
    pub fn from_base62(kind: &str, base62: &str) -> Option<Self> {
        Self::new(ItemKind::parse(kind), base62)
    }

    /// Parse `spotify:<kind>:<id>` or `spotify:user:<user>:playlist:<id>`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let rest = uri.trim().strip_prefix("spotify:")?;
        let mut parts = rest.splitn(2, ':');
        let kind = parts.next().filter(|k| !k.is_empty())?;
        let remainder = parts.next().filter(|r| !r.is_empty())?;

        if kind == "user" {
            // spotify:user:<name>:playlist:<id>
            let segs: Vec<&str> = remainder.split(':').collect();
            if segs.len() == 3 && segs[1] == "playlist" {
                return Self::new(ItemKind::Playlist, segs[2]);
            }
            return Self::new(ItemKind::Other("user".to_string()), remainder);
        }

        Self::new(ItemKind::parse(kind), remainder)
    }

    /// `from_uri` that also accepts `None` / empty input.
    pub fn parse_opt(uri: Option<&str>) -> Option<Self> {
        uri.filter(|s| !s.is_empty()).and_then(Self::from_uri)
    }

    pub fn uri(&self) -> String {
        format!("spotify:{}:{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Display for SpotifyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spotify:{}:{}", self.kind.as_str(), self.id)
    }
}

fn is_base62(s: &str) -> bool {
    s.len() == BASE62_LEN && s.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_uri() {
        let id = SpotifyId::from_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(id.kind, ItemKind::Track);
        assert_eq!(id.id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(id.uri(), "spotify:track:4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn parses_legacy_user_playlist_uri() {
        let id = SpotifyId::from_uri("spotify:user:bob:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap();
        assert_eq!(id.kind, ItemKind::Playlist);
        assert_eq!(id.uri(), "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn keeps_unknown_kinds_opaque() {
        let id = SpotifyId::from_uri("spotify:user:bob:collection").unwrap();
        assert_eq!(id.kind, ItemKind::Other("user".into()));
        assert_eq!(id.uri(), "spotify:user:bob:collection");
    }

    #[test]
    fn rejects_garbage() {
        assert!(SpotifyId::from_uri("").is_none());
        assert!(SpotifyId::from_uri("spotify:").is_none());
        assert!(SpotifyId::from_uri("spotify:track:").is_none());
        assert!(SpotifyId::from_uri("spotify:track:short").is_none());
        assert!(SpotifyId::from_uri("https://open.spotify.com/track/x").is_none());
        assert!(SpotifyId::parse_opt(None).is_none());
        assert!(SpotifyId::parse_opt(Some("")).is_none());
    }
}
