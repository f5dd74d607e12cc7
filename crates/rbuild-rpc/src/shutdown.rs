//! Graceful shutdown handling for the build service

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;

/// Shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// User initiated shutdown (Ctrl-C)
    UserRequest,
    /// External shutdown request
    External,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::UserRequest => write!(f, "user request"),
            ShutdownReason::External => write!(f, "external request"),
        }
    }
}

/// Shutdown signal containing reason and optional message
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    pub reason: ShutdownReason,
    pub message: Option<String>,
}

impl ShutdownSignal {
    pub fn user_request() -> Self {
        Self {
            reason: ShutdownReason::UserRequest,
            message: Some("Shutdown requested by user (Ctrl-C)".to_string()),
        }
    }

    pub fn external(message: Option<String>) -> Self {
        Self { reason: ShutdownReason::External, message }
    }
}

/// Graceful shutdown manager
///
/// The service checks it between deliveries; a build in progress always
/// runs to its response.
pub struct ShutdownManager {
    /// Level-triggered shutdown state
    requested: watch::Sender<bool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(false);
        Self { requested }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown_requested(&self) -> bool {
        *self.requested.borrow()
    }

    /// Request shutdown with a specific reason
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        info!("Shutdown requested: {}", signal.reason);
        if let Some(message) = &signal.message {
            info!("Shutdown message: {}", message);
        }

        self.requested.send_replace(true);
    }

    /// Resolve once shutdown has been requested, immediately if it already was
    pub async fn cancelled(&self) {
        let mut receiver = self.requested.subscribe();
        // The sender lives as long as `self`, so this only fails after shutdown
        let _ = receiver.wait_for(|requested| *requested).await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handlers(shutdown_manager: Arc<ShutdownManager>) -> Result<()> {
    info!("Setting up signal handlers for graceful shutdown");

    let ctrl_c_manager = Arc::clone(&shutdown_manager);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT (Ctrl-C)");
            ctrl_c_manager.request_shutdown(ShutdownSignal::user_request());
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::spawn(async move {
            sigterm.recv().await;
            info!("Received SIGTERM");
            shutdown_manager
                .request_shutdown(ShutdownSignal::external(Some("SIGTERM received".to_string())));
        });
    }

    debug!("Signal handlers setup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_request() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown_requested());

        manager.request_shutdown(ShutdownSignal::user_request());
        assert!(manager.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_request() {
        let manager = Arc::new(ShutdownManager::new());

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.cancelled().await })
        };
        manager.request_shutdown(ShutdownSignal::external(None));
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();

        // Already requested: resolves immediately
        timeout(Duration::from_millis(100), manager.cancelled()).await.unwrap();
    }

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownReason::UserRequest.to_string(), "user request");
        assert_eq!(
            ShutdownSignal::user_request().message.as_deref(),
            Some("Shutdown requested by user (Ctrl-C)")
        );
        assert_eq!(ShutdownReason::External.to_string(), "external request");
    }
}
