//! Connect remote-control daemon: dealer session, HTTP collaborators and the
//! local control API.

pub mod apresolve;
pub mod dispatcher;
pub mod events;
pub mod http;
pub mod session;
pub mod spclient;
pub mod token;
pub mod transport;

pub use session::{Session, SessionConfig, SessionDeps, SessionHandle};
