//! Cache of control-plane clients keyed by world server game address.
//!
//! Sessions know the game address of the world server a player is on. The
//! servers registry tells which control address belongs to it; the registry
//! records that mapping and keeps one client per game address for the life of
//! the process.

pub mod control;

pub use control::{AddPlayersRequest, ControlPlaneClient, ControlPlaneConnector};

use crate::services::ServiceError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No control address known for game server {0}")]
    UnknownGameServer(String),

    #[error("Can't connect to control plane of {game_address} at {control_address}: {source}")]
    Connect {
        game_address: String,
        control_address: String,
        #[source]
        source: ServiceError,
    },
}

/// Shared registry of control-plane clients.
///
/// Uses `RwLock<HashMap>` since lookups vastly outnumber new servers.
pub struct BackendRegistry {
    connector: Arc<dyn ControlPlaneConnector>,
    addresses: RwLock<HashMap<String, String>>,
    clients: RwLock<HashMap<String, Arc<dyn ControlPlaneClient>>>,
}

impl BackendRegistry {
    pub fn new(connector: Arc<dyn ControlPlaneConnector>) -> Self {
        Self {
            connector,
            addresses: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Records the control address of a game server. The last mapping wins.
    pub async fn add_address_mapping(&self, game_address: &str, control_address: &str) {
        let previous = self
            .addresses
            .write()
            .await
            .insert(game_address.to_string(), control_address.to_string());
        if previous.as_deref() != Some(control_address) {
            debug!("🗺️ Mapped game server {} to control plane {}", game_address, control_address);
        }
    }

    /// Returns the client for `game_address`, connecting on first use.
    ///
    /// Two sessions racing on a miss may both connect; the last client stored
    /// wins and both callers get a working client.
    pub async fn client_for(&self, game_address: &str) -> Result<Arc<dyn ControlPlaneClient>, RegistryError> {
        if let Some(client) = self.clients.read().await.get(game_address) {
            return Ok(client.clone());
        }

        let control_address = self
            .addresses
            .read()
            .await
            .get(game_address)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownGameServer(game_address.to_string()))?;

        let client = self
            .connector
            .connect(&control_address)
            .await
            .map_err(|source| RegistryError::Connect {
                game_address: game_address.to_string(),
                control_address: control_address.clone(),
                source,
            })?;

        self.clients
            .write()
            .await
            .insert(game_address.to_string(), client.clone());
        info!("🔌 Connected to control plane of {} at {}", game_address, control_address);
        Ok(client)
    }

    pub async fn cached_clients(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeControlPlaneConnector;

    #[tokio::test]
    async fn test_missing_mapping_is_descriptive_error() {
        let registry = BackendRegistry::new(Arc::new(FakeControlPlaneConnector::default()));
        let err = registry.client_for("10.0.0.1:8085").await.err().expect("no mapping");
        assert!(matches!(err, RegistryError::UnknownGameServer(_)));
        assert!(err.to_string().contains("10.0.0.1:8085"));
    }

    #[tokio::test]
    async fn test_client_is_cached_by_game_address() {
        let connector = Arc::new(FakeControlPlaneConnector::default());
        let registry = BackendRegistry::new(connector.clone());
        registry.add_address_mapping("10.0.0.1:8085", "10.0.0.1:9501").await;

        registry.client_for("10.0.0.1:8085").await.unwrap();
        registry.client_for("10.0.0.1:8085").await.unwrap();

        assert_eq!(connector.connected_addresses().await, vec!["10.0.0.1:9501".to_string()]);
        assert_eq!(registry.cached_clients().await, 1);
    }

    #[tokio::test]
    async fn test_last_mapping_wins() {
        let connector = Arc::new(FakeControlPlaneConnector::default());
        let registry = BackendRegistry::new(connector.clone());
        registry.add_address_mapping("world:8085", "old:9501").await;
        registry.add_address_mapping("world:8085", "new:9501").await;

        registry.client_for("world:8085").await.unwrap();
        assert_eq!(connector.connected_addresses().await, vec!["new:9501".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_cached() {
        let connector = Arc::new(FakeControlPlaneConnector::default());
        connector.fail_next(1).await;
        let registry = BackendRegistry::new(connector.clone());
        registry.add_address_mapping("world:8085", "control:9501").await;

        assert!(matches!(
            registry.client_for("world:8085").await,
            Err(RegistryError::Connect { .. })
        ));
        let client = registry.client_for("world:8085").await.unwrap();
        assert!(client.can_player_join_battleground_queue(1).await.unwrap());
    }
}
