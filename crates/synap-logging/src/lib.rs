//! # synap-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the process-wide subscriber: an
//!   [`EnvFilter`] honouring `RUST_LOG` (falling back to the configured
//!   level) and a `fmt` layer writing compact text or JSON lines to stderr.
//! - [`capture_logs`] installs a thread-local in-memory subscriber so tests
//!   can assert on emitted events.
//!
//! Connection context (`conn_id`, `user_id`, `topic`) travels as span and
//! event fields rather than being formatted into messages.
//!
//! [`EnvFilter`]: tracing_subscriber::EnvFilter

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};
pub use synap_settings::LogFormat;

/// Initialize the global tracing subscriber.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Default filter directive used when `RUST_LOG` is unset.
/// * `format` - Compact human-readable text or one JSON object per line.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}
