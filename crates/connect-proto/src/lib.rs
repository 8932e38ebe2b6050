//! Wire types and pure logic for the Connect remote-control protocol.
//!
//! Nothing in this crate performs network I/O.  The daemon crate owns the
//! websocket, the HTTP clients and the session task; everything it needs to
//! parse, reduce or build lives here so it can be tested in isolation.

pub mod cluster;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod library;
pub mod platform;
pub mod protocol;
pub mod state;

pub use error::{ConnectError, ContextError, DecodeError};
pub use id::{ItemKind, SpotifyId};
pub use state::{RemoteState, RepeatState};
