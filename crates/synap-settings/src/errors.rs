//! Settings error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The settings file is not JSON.
    #[error("{} is not valid settings JSON: {source}", .path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit [`SynapSettings`](crate::SynapSettings).
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value (or combination of values) no server can run with.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// camelCase name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
