//! # synap-settings
//!
//! Configuration for the synap realtime server, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`SynapSettings::default()`]
//! 2. **User file**: `~/.synap/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SYNAP_*`, `PORT`, `JWT_SECRET`,
//!    `CORS_ORIGIN` (highest priority)
//!
//! Settings are loaded once at startup and passed down explicitly; there is
//! no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{AuthSettings, LogFormat, LoggingSettings, ServerSettings, SynapSettings};
