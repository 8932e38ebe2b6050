use thiserror::Error;

/// A single inbound message could not be understood.  Never fatal to the
/// connection; the read loop logs it and moves on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip payload: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("invalid protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected message: {0}")]
    Unexpected(String),
}

/// Errors surfaced by the remote session.
///
/// `Transport` and `ProtocolViolation` are handled inside the session by
/// reconnecting.  The precondition variants are returned to callers of
/// `send_command` / `takeover` and are never retried automatically.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("no active device")]
    NoActiveDevice,
    #[error("session not ready: connection id not established")]
    NotReady,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ConnectError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Command precondition failures, as opposed to connection trouble.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoActiveDevice | Self::NotReady | Self::NothingPlaying
        )
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

/// A page fetch failed.  Exhaustion is not an error; fetchers signal it by
/// returning `Ok(None)`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ContextError(#[from] anyhow::Error);

impl ContextError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self(anyhow::anyhow!("{}", message))
    }
}
