//! # synap
//!
//! Synap server binary: loads settings, wires the token verifier into the
//! realtime server and serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use synap_auth::JwtVerifier;
use synap_server::config::ServerConfig;
use synap_server::server::SynapServer;
use synap_settings::{AuthSettings, SynapSettings};

/// Synap realtime notification server.
#[derive(Parser, Debug)]
#[command(name = "synap", about = "Synap realtime notification server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long, short)]
    port: Option<u16>,

    /// Path to the settings file (defaults to `~/.synap/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut SynapSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

fn build_verifier(auth: &AuthSettings) -> JwtVerifier {
    if auth.jwt_secret == AuthSettings::default().jwt_secret {
        tracing::warn!("using the default JWT secret, set JWT_SECRET in production");
    }
    let verifier = JwtVerifier::new(auth.jwt_secret.as_bytes());
    match auth.issuer {
        Some(ref issuer) => verifier.with_issuer(issuer),
        None => verifier,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(synap_settings::settings_path);
    let mut settings = synap_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    synap_logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = match synap_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let verifier = build_verifier(&settings.auth);
    let server = SynapServer::new(
        ServerConfig::from(&settings.server),
        Arc::new(verifier),
        metrics,
    );

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        max_connections = settings.server.max_connections,
        "Synap listening on ws://{addr}/ws"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown().drain(handle, Duration::from_secs(10)).await {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown incomplete, exiting anyway");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["synap"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.settings.is_none());

        let mut settings = SynapSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn cli_overrides_host_and_port() {
        let cli = Cli::parse_from(["synap", "--host", "127.0.0.1", "-p", "8080"]);
        let mut settings = SynapSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["synap", "--settings", "/tmp/synap.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/synap.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["synap", "--port", "http"]).is_err());
    }

    #[test]
    fn settings_file_feeds_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"maxConnections": 5}}"#).unwrap();

        let settings = synap_settings::load_settings_from_path(&path).unwrap();
        let config = ServerConfig::from(&settings.server);
        assert_eq!(config.max_connections, 5);
    }

    #[tokio::test]
    async fn verifier_honours_issuer() {
        use synap_auth::TokenVerifier;
        use synap_auth::test_utils::{TEST_SECRET, create_test_token_with_options};

        let auth = AuthSettings {
            jwt_secret: String::from_utf8(TEST_SECRET.to_vec()).unwrap(),
            issuer: Some("hackathon-api".into()),
        };
        let verifier = build_verifier(&auth);
        let hour = chrono::Duration::hours(1);

        let good = create_test_token_with_options(Some("u1"), Some("hackathon-api"), TEST_SECRET, hour);
        assert_eq!(verifier.verify(&good).await.unwrap().as_str(), "u1");

        let foreign = create_test_token_with_options(Some("u1"), Some("other"), TEST_SECRET, hour);
        assert!(verifier.verify(&foreign).await.is_err());
    }
}
