//! Main application logic and lifecycle management.
//!
//! The `Application` wires the remote services, the updates barrier and the
//! gateway server together, and runs them until a termination signal arrives.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use gateway_events::{ChannelEventsProducer, CharactersUpdatesBarrier, EventBroadcaster, ShutdownState};
use gateway_server::endpoint::TcpBackendConnector;
use gateway_server::registry::BackendRegistry;
use gateway_server::services::rpc::JsonRpcControlConnector;
use gateway_server::services::{JsonRpcClient, ServersRegistry};
use gateway_server::session::{HandlerTables, SessionDeps};
use gateway_server::{GatewayConfig, GatewayServer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the outbound events channel.
const OUTBOUND_EVENTS_CAPACITY: usize = 1024;

/// How long sessions get to end after shutdown is initiated.
const SESSIONS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main application struct.
///
/// Manages the complete lifecycle of the gateway: configuration, service
/// wiring, registration with the servers registry and phased shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Converted server configuration
    gateway_config: GatewayConfig,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(realm_id) = args.realm_id {
            config.server.realm_id = realm_id;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| format!("Configuration validation failed: {e}"))?;
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let gateway_config = config.to_gateway_config()?;
        Ok(Self { config, gateway_config })
    }

    /// Runs the gateway until a shutdown signal is received.
    ///
    /// # Shutdown Phases
    ///
    /// 1. Stop accepting connections and cancel every session
    /// 2. Wait for sessions to end, so their logouts reach the barrier
    /// 3. Flush the characters updates barrier
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let services = &self.config.services;
        let realm_id = self.config.server.realm_id;
        let accounts = Arc::new(JsonRpcClient::new(services.accounts.clone()));
        let characters = Arc::new(JsonRpcClient::new(services.characters.clone()));
        let servers = Arc::new(JsonRpcClient::new(services.servers_registry.clone()));
        let matchmaking = Arc::new(JsonRpcClient::new(services.matchmaking.clone()));
        let groups = Arc::new(JsonRpcClient::new(services.groups.clone()));
        let chat = Arc::new(JsonRpcClient::new(services.chat.clone()));

        let producer = Arc::new(ChannelEventsProducer::new(OUTBOUND_EVENTS_CAPACITY));
        let relay_handle = producer.spawn_log_relay();

        let (barrier, worker) = CharactersUpdatesBarrier::new(producer.clone(), realm_id, self.config.flush_interval());
        let barrier_token = CancellationToken::new();
        let barrier_handle = tokio::spawn(worker.run(barrier_token.clone()));

        let advertised = self.config.advertised_address()?;
        servers
            .register_gateway(&advertised, realm_id)
            .await
            .map_err(|e| format!("Can't register gateway {advertised} for realm {realm_id}: {e}"))?;
        info!("📝 Registered gateway {} for realm {}", advertised, realm_id);

        let deps = SessionDeps {
            characters,
            servers,
            matchmaking,
            groups,
            chat,
            registry: Arc::new(BackendRegistry::new(Arc::new(JsonRpcControlConnector))),
            connector: Arc::new(TcpBackendConnector),
            broadcaster: EventBroadcaster::new(),
            producer,
            barrier,
            tables: HandlerTables::new(),
            settings: self.gateway_config.session.clone(),
        };
        let server = GatewayServer::new(self.gateway_config, accounts, deps);

        let shutdown_state = ShutdownState::new();
        let mut server_handle = {
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("✅ Gateway is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            finished = &mut server_handle => {
                // The server only returns on its own when it could not start.
                barrier_token.cancel();
                let _ = barrier_handle.await;
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(e.into()),
                };
            }
            signal = wait_for_shutdown_signal() => signal?,
        }

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown signal received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Closing the listener and ending sessions...");
        shutdown_state.initiate_shutdown();

        info!("⏳ Phase 2: Waiting for sessions to end...");
        match tokio::time::timeout(SESSIONS_DRAIN_TIMEOUT, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ All sessions ended"),
            Ok(Ok(Err(e))) => error!("❌ Server error: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏰ Sessions did not end within {:?}, proceeding", SESSIONS_DRAIN_TIMEOUT),
        }
        shutdown_state.complete_shutdown();

        info!("🧹 Phase 3: Flushing characters updates...");
        barrier_token.cancel();
        if let Err(e) = barrier_handle.await {
            error!("❌ Characters updates barrier failed: {}", e);
        }
        relay_handle.abort();

        info!("👋 Gateway shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  🏰 Realm: {}", self.config.server.realm_id);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  ⏱️ Packet timeout: {}ms", self.config.server.packet_timeout_ms);
        info!(
            "  🔁 Recovery: {} attempt(s), {}ms apart",
            self.config.recovery.attempts, self.config.recovery.retry_delay_ms
        );
        info!("  🔀 Show redirects: {}", self.config.server.show_redirects);
    }
}
