//! # synap-server
//!
//! Realtime notification fan-out over axum WebSockets.
//!
//! - Connection registry and subscription index, owned together by the [`Hub`]
//! - Protocol dispatch for `AUTHENTICATE` / `SUBSCRIBE` / `UNSUBSCRIBE`
//! - Fan-out to a single connection, every session of a user, or a topic
//! - Lifecycle supervision: accept, heartbeat, exactly-once teardown
//! - HTTP endpoints: health, stats, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`
//!
//! [`Hub`]: websocket::hub::Hub

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
