// WebSocket surface: the persistent connection protocol, per-connection
// authentication, topic fan-out, and the frame dispatcher.

pub mod auth;
pub mod broadcast;
pub mod handler;
pub mod protocol;


pub use handler::{router, WsState};
