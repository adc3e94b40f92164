//! Implementation of the Client API.

pub mod server;
pub mod session;

pub use self::{server::AppContext, session::WsSession};
