//! Shutdown coordination for graceful gateway shutdown.
//!
//! The accept loop, every session and the background workers observe one
//! cancellation token. Initiating shutdown cancels it; completion is tracked
//! separately so the application can wait for in-flight work to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Cancelled once shutdown has been initiated
    token: CancellationToken,
    /// Set once in-flight work has drained and final cleanup can begin
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true if shutdown has been initiated - no new connections should be accepted.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Token cancelled when shutdown is initiated. Components derive child
    /// tokens from it for their own scopes.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits until shutdown is initiated.
    pub async fn initiated(&self) {
        self.token.cancelled().await
    }

    pub fn initiate_shutdown(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
    }

    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All sessions drained - ready for final cleanup");
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initiate_cancels_child_scopes() {
        let state = ShutdownState::new();
        let child = state.token().child_token();
        assert!(!state.is_shutdown_initiated());

        state.initiate_shutdown();
        child.cancelled().await;
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());

        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }
}
