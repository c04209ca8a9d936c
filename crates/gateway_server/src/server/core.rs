//! Core gateway server implementation.
//!
//! This module contains the `GatewayServer` struct, which owns the listening
//! socket, bounds the number of concurrent connections and tracks running
//! sessions so shutdown can wait for them.

use crate::{
    config::GatewayConfig,
    error::ServerError,
    server::handlers::handle_connection,
    services::AccountRepository,
    session::SessionDeps,
};
use gateway_events::ShutdownState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// The gateway server.
///
/// Accepts game clients, authenticates them and runs one
/// [`GameSession`](crate::session::GameSession) per connection. Sessions share
/// the [`SessionDeps`] the server was built with.
pub struct GatewayServer {
    /// Server configuration settings
    config: GatewayConfig,

    /// Account lookup for the handshake
    accounts: Arc<dyn AccountRepository>,

    /// Services, registry and handler tables shared by all sessions
    deps: Arc<SessionDeps>,

    /// Running connection tasks
    sessions: TaskTracker,
}

impl GatewayServer {
    /// Creates a new gateway server.
    ///
    /// The session settings of `deps` are used for every session; those of
    /// `config` are not consulted again.
    pub fn new(config: GatewayConfig, accounts: Arc<dyn AccountRepository>, deps: SessionDeps) -> Self {
        Self {
            config,
            accounts,
            deps: Arc::new(deps),
            sessions: TaskTracker::new(),
        }
    }

    /// Binds the configured address and serves until shutdown is initiated.
    ///
    /// # Returns
    ///
    /// `Ok(())` once every session has ended after shutdown, or a
    /// `ServerError` if the address can't be bound.
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {}", self.config.bind_address, e)))?;
        self.serve(listener, shutdown_state).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// Stops accepting when shutdown is initiated. Sessions observe the same
    /// shutdown token and end on their own; this waits for them.
    pub async fn serve(&self, listener: TcpListener, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let local_address = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Gateway listening on {} (realm {})", local_address, self.deps.settings.realm_id);

        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let shutdown = shutdown_state.token();

        loop {
            let (stream, addr) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let Ok(permit) = permits.clone().try_acquire_owned() else {
                warn!("🚫 Connection limit of {} reached, rejecting {}", self.config.max_connections, addr);
                continue;
            };

            let accounts = self.accounts.clone();
            let deps = self.deps.clone();
            let session_shutdown = shutdown.clone();
            self.sessions.spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_connection(stream, addr, accounts, deps, session_shutdown).await {
                    debug!("Connection {} ended: {}", addr, e);
                }
            });
        }

        self.sessions.close();
        info!("⏳ Waiting for {} session(s) to end", self.sessions.len());
        self.sessions.wait().await;
        info!("✅ Server stopped");
        Ok(())
    }

    /// Number of connections being handshaken or served.
    pub fn active_connections(&self) -> usize {
        self.sessions.len()
    }
}
