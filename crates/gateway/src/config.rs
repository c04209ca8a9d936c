//! Configuration management for the gateway.
//!
//! This module handles loading, validation, and conversion of the gateway
//! configuration from TOML files.

use gateway_server::{GatewayConfig, SessionSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener and session behavior
    #[serde(default)]
    pub server: ServerSettings,
    /// World server crash recovery
    #[serde(default)]
    pub recovery: RecoverySettings,
    /// Moving sessions between world servers
    #[serde(default)]
    pub redirect: RedirectSettings,
    /// Batched character updates
    #[serde(default)]
    pub updates: UpdatesSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Addresses of the remote services
    #[serde(default)]
    pub services: ServiceSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the gateway to (e.g., "0.0.0.0:8085")
    pub bind_address: String,
    /// Realm served by this gateway
    pub realm_id: u32,
    /// Host name advertised to the servers registry
    pub preferred_hostname: String,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
    /// Deadline of a single packet handler in milliseconds
    pub packet_timeout_ms: u64,
    /// Tell players which world server they were moved to
    pub show_redirects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub notify_delay_ms: u64,
    pub resume_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectSettings {
    /// How long the old world server has to confirm a redirect
    pub confirm_timeout_ms: u64,
    /// Pause between the auth frame and the player login on a new world
    /// connection
    pub login_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatesSettings {
    pub flush_interval_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// `host:port` addresses of the JSON-lines services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub accounts: String,
    pub characters: String,
    pub servers_registry: String,
    pub matchmaking: String,
    pub groups: String,
    pub chat: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8085".to_string(),
            realm_id: 1,
            preferred_hostname: "127.0.0.1".to_string(),
            max_connections: 1000,
            packet_timeout_ms: 5000,
            show_redirects: false,
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self { attempts: 3, retry_delay_ms: 5000, notify_delay_ms: 2000, resume_delay_ms: 1000 }
    }
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self { confirm_timeout_ms: 5000, login_delay_ms: 100 }
    }
}

impl Default for UpdatesSettings {
    fn default() -> Self {
        Self { flush_interval_ms: 1000 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            accounts: "127.0.0.1:9001".to_string(),
            characters: "127.0.0.1:9002".to_string(),
            servers_registry: "127.0.0.1:9003".to_string(),
            matchmaking: "127.0.0.1:9004".to_string(),
            groups: "127.0.0.1:9005".to_string(),
            chat: "127.0.0.1:9006".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Address other components use to reach this gateway: the preferred host
    /// name with the port of the bind address.
    pub fn advertised_address(&self) -> Result<String, Box<dyn std::error::Error>> {
        let bind: SocketAddr = self.server.bind_address.parse()?;
        Ok(format!("{}:{}", self.server.preferred_hostname, bind.port()))
    }

    /// Converts the application configuration to the gateway server
    /// configuration.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
        Ok(GatewayConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            session: SessionSettings {
                realm_id: self.server.realm_id,
                gateway_id: self.advertised_address()?,
                packet_timeout: Duration::from_millis(self.server.packet_timeout_ms),
                show_redirects: self.server.show_redirects,
                redirect_confirm_timeout: Duration::from_millis(self.redirect.confirm_timeout_ms),
                login_delay: Duration::from_millis(self.redirect.login_delay_ms),
                recovery_attempts: self.recovery.attempts,
                recovery_retry_delay: Duration::from_millis(self.recovery.retry_delay_ms),
                recovery_notify_delay: Duration::from_millis(self.recovery.notify_delay_ms),
                recovery_resume_delay: Duration::from_millis(self.recovery.resume_delay_ms),
            },
        })
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.updates.flush_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing
    /// the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.preferred_hostname.is_empty() {
            return Err("server.preferred_hostname cannot be empty".to_string());
        }

        let positive = [
            ("server.max_connections", self.server.max_connections as u64),
            ("server.packet_timeout_ms", self.server.packet_timeout_ms),
            ("recovery.attempts", self.recovery.attempts as u64),
            ("recovery.retry_delay_ms", self.recovery.retry_delay_ms),
            ("recovery.notify_delay_ms", self.recovery.notify_delay_ms),
            ("recovery.resume_delay_ms", self.recovery.resume_delay_ms),
            ("redirect.confirm_timeout_ms", self.redirect.confirm_timeout_ms),
            ("redirect.login_delay_ms", self.redirect.login_delay_ms),
            ("updates.flush_interval_ms", self.updates.flush_interval_ms),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{key} must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        let services = [
            ("services.accounts", &self.services.accounts),
            ("services.characters", &self.services.characters),
            ("services.servers_registry", &self.services.servers_registry),
            ("services.matchmaking", &self.services.matchmaking),
            ("services.groups", &self.services.groups),
            ("services.chat", &self.services.chat),
        ];
        if let Some((key, _)) = services.iter().find(|(_, address)| address.is_empty()) {
            return Err(format!("{key} cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "0.0.0.0:8085");
        assert_eq!(config.server.realm_id, 1);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.packet_timeout_ms, 5000);
        assert!(!config.server.show_redirects);
        assert_eq!(config.recovery.attempts, 3);
        assert_eq!(config.recovery.retry_delay_ms, 5000);
        assert_eq!(config.redirect.confirm_timeout_ms, 5000);
        assert_eq!(config.redirect.login_delay_ms, 100);
        assert_eq!(config.updates.flush_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:8085");
        assert!(path.exists());
        let written = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(written.services.matchmaking, config.services.matchmaking);
    }

    #[tokio::test]
    async fn test_load_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
bind_address = "127.0.0.1:3724"
realm_id = 4
show_redirects = true

[recovery]
attempts = 5

[services]
accounts = "accounts.internal:7000"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:3724");
        assert_eq!(config.server.realm_id, 4);
        assert!(config.server.show_redirects);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.recovery.attempts, 5);
        assert_eq!(config.recovery.retry_delay_ms, 5000);
        assert_eq!(config.services.accounts, "accounts.internal:7000");
        assert_eq!(config.services.characters, "127.0.0.1:9002");
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_load_malformed_file_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[server\nbind_address = 1").unwrap();
        assert!(AppConfig::load_from_file(file.path()).await.is_err());
    }

    #[test]
    fn test_to_gateway_config_conversion() {
        let mut config = AppConfig::default();
        config.server.bind_address = "0.0.0.0:9085".to_string();
        config.server.preferred_hostname = "gw1.example".to_string();
        config.server.packet_timeout_ms = 250;
        config.recovery.attempts = 7;

        let gateway = config.to_gateway_config().unwrap();

        assert_eq!(gateway.bind_address.port(), 9085);
        assert_eq!(gateway.max_connections, 1000);
        assert_eq!(gateway.session.gateway_id, "gw1.example:9085");
        assert_eq!(gateway.session.packet_timeout, Duration::from_millis(250));
        assert_eq!(gateway.session.recovery_attempts, 7);
        assert_eq!(gateway.session.login_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut config = AppConfig::default();
        config.recovery.attempts = 0;
        assert_eq!(config.validate(), Err("recovery.attempts must be greater than 0".to_string()));

        let mut config = AppConfig::default();
        config.redirect.confirm_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        for level in ["trace", "debug", "info", "warn", "error"] {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_validation_empty_service_address() {
        let mut config = AppConfig::default();
        config.services.servers_registry.clear();
        assert_eq!(config.validate(), Err("services.servers_registry cannot be empty".to_string()));
    }
}
