//! # synap-core
//!
//! Foundation types shared by every synap crate.
//!
//! - **Branded IDs**: [`ConnectionId`], [`UserId`] and [`Topic`] as newtypes
//! - **Inbound frames**: [`ClientMessage`], the closed set of requests a
//!   client may send, parsed from the `{ type, payload?, token? }` JSON shape
//! - **Outbound messages**: [`ServerMessage`] tagged union and the
//!   [`OutboundMessage`] envelope carrying an optional timestamp
//! - **Errors**: [`ProtocolError`] for frames that cannot be dispatched

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod messages;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, Topic, UserId};
pub use messages::{ClientMessage, InboundFrame, OutboundMessage, ServerMessage};
