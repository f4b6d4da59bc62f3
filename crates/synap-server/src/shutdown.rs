//! Shutdown signalling.
//!
//! One `CancellationToken` is shared by the HTTP listener and every live
//! WebSocket session. Cancelling it refuses new upgrades, makes each
//! session send a close frame, and lets `axum::serve` return.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the shutdown token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the listener and to each session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the token has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token, then give the serve task `grace` to finish.
    ///
    /// Returns `false` if the server was still running when `grace` ran out.
    pub async fn drain(&self, server: JoinHandle<()>, grace: Duration) -> bool {
        self.shutdown();
        info!(grace_secs = grace.as_secs(), "draining server");
        match tokio::time::timeout(grace, server).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "server task ended abnormally during shutdown");
                true
            }
            Err(_) => {
                warn!(?grace, "server still running after grace period");
                false
            }
        }
    }
}
