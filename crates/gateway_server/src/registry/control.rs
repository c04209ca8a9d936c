//! Control-plane API of a world server.

use crate::services::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPlayersRequest {
    pub bg_type_id: u32,
    pub instance_id: u32,
    pub alliance: Vec<u64>,
    pub horde: Vec<u64>,
}

/// Operations a session issues against the world server hosting a player.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Whether the player may queue, e.g. is not flagged as a deserter.
    async fn can_player_join_battleground_queue(&self, guid: u64) -> Result<bool, ServiceError>;

    async fn add_players_to_battleground(&self, request: AddPlayersRequest) -> Result<(), ServiceError>;
}

/// Opens control-plane clients by control address.
#[async_trait]
pub trait ControlPlaneConnector: Send + Sync {
    async fn connect(&self, control_address: &str) -> Result<Arc<dyn ControlPlaneClient>, ServiceError>;
}
