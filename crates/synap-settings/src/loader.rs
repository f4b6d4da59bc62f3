//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SynapSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, SynapSettings};

/// Resolve the path to the settings file (`~/.synap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".synap").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SynapSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<SynapSettings> {
    let defaults = serde_json::to_value(SynapSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject combinations no server can run with.
pub fn validate(settings: &SynapSettings) -> Result<()> {
    let server = &settings.server;
    if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
        return Err(SettingsError::Invalid {
            field: "heartbeatTimeoutSecs",
            reason: format!(
                "{} is below heartbeatIntervalSecs ({})",
                server.heartbeat_timeout_secs, server.heartbeat_interval_secs
            ),
        });
    }
    if server.send_queue_capacity == 0 {
        return Err(SettingsError::Invalid {
            field: "sendQueueCapacity",
            reason: "must be positive".to_string(),
        });
    }
    if settings.auth.jwt_secret.is_empty() {
        return Err(SettingsError::Invalid {
            field: "auth.jwtSecret",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut SynapSettings) {
    apply_overrides(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; invalid values are logged and
/// ignored (falling back to file/default). `SYNAP_PORT` wins over `PORT`.
pub fn apply_overrides(settings: &mut SynapSettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SYNAP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u16("SYNAP_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("SYNAP_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("SYNAP_HEARTBEAT_INTERVAL", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("SYNAP_HEARTBEAT_TIMEOUT", 1, 7200) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.string("CORS_ORIGIN") {
        settings.server.cors_origin = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.string("SYNAP_JWT_ISSUER") {
        settings.auth.issuer = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SYNAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("SYNAP_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "SYNAP_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
