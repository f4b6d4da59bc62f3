//! WebSocket connection state, subscription tracking, dispatch and fan-out.

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod hub;
pub mod registry;
pub mod session;
pub mod subscription;
