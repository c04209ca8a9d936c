//! Server configuration types and defaults.
//!
//! This module contains the configuration of the accept loop and the timing
//! knobs every session is created with.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the gateway server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent client connections allowed
    pub max_connections: usize,

    /// Settings shared by every session
    pub session: SessionSettings,
}

/// Per-session behavior and timings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Realm served by this gateway
    pub realm_id: u32,

    /// Identifier used in published events, usually the advertised address
    pub gateway_id: String,

    /// Deadline of a single packet or event handler
    pub packet_timeout: Duration,

    /// Tell players which world server they were moved to
    pub show_redirects: bool,

    /// Time to wait for the old world server to confirm a redirect
    pub redirect_confirm_timeout: Duration,

    /// Pause between the auth frame and the player login on a new world
    /// connection, so the world server can register the session
    pub login_delay: Duration,

    /// Reconnect attempts after a world server is lost
    pub recovery_attempts: u32,

    /// Pause between reconnect attempts
    pub recovery_retry_delay: Duration,

    /// Pause after telling the player the connection was lost
    pub recovery_notify_delay: Duration,

    /// Pause after announcing the recovery, before the first attempt
    pub recovery_resume_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8085)),
            max_connections: 1000,
            session: SessionSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            realm_id: 1,
            gateway_id: "127.0.0.1:8085".to_string(),
            packet_timeout: Duration::from_secs(5),
            show_redirects: false,
            redirect_confirm_timeout: Duration::from_secs(5),
            login_delay: Duration::from_millis(100),
            recovery_attempts: 3,
            recovery_retry_delay: Duration::from_secs(5),
            recovery_notify_delay: Duration::from_secs(2),
            recovery_resume_delay: Duration::from_secs(1),
        }
    }
}
