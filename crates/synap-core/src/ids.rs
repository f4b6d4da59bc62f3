//! Branded ID newtypes for type safety.
//!
//! Connection ids, user identities and topics are all strings on the wire.
//! Wrapping each in its own newtype prevents passing a user id where a
//! connection id is expected when walking the reverse-lookup maps.
//!
//! Only [`ConnectionId`] is generated locally (UUID v7, time-ordered). User
//! identities come from the authentication collaborator and topics come from
//! clients or domain controllers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Process-unique identifier of a live client connection.
    ConnectionId
}

branded_id! {
    /// Identity of an authenticated user, as returned by token verification.
    UserId
}

branded_id! {
    /// Subscription scope: an event identifier, or the reserved
    /// [`Topic::GLOBAL`] scope for cross-event announcements.
    Topic
}

impl ConnectionId {
    /// Generate a fresh connection id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Topic {
    /// Name of the reserved topic used for announcements without an event.
    pub const GLOBAL: &'static str = "global";

    /// The reserved global topic.
    #[must_use]
    pub fn global() -> Self {
        Self(Self::GLOBAL.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
