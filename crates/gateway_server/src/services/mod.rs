//! Contracts of the services the gateway consumes.
//!
//! Sessions only see these traits. [`rpc::JsonRpcClient`] implements all of
//! them over a JSON-lines TCP connection; tests use in-memory fakes.

pub mod rpc;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use rpc::JsonRpcClient;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("Service closed the connection")]
    Closed,

    #[error("{namespace}.{event} failed: {message}")]
    Remote { namespace: String, event: String, message: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Account as stored by the authentication server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: u32,
    pub username: String,
    /// 40-byte session key negotiated during login.
    pub session_key: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentDisplay {
    pub display_info_id: u32,
    pub inventory_type: u8,
    pub enchantment_id: u32,
}

/// Character record as needed for the character screen and world login.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Character {
    pub guid: u64,
    pub account_id: u32,
    pub name: String,
    pub race: u8,
    pub class: u8,
    pub gender: u8,
    pub skin: u8,
    pub face: u8,
    pub hair_style: u8,
    pub hair_color: u8,
    pub facial_style: u8,
    pub level: u8,
    pub zone: u32,
    pub map: u32,
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub guild_id: u32,
    pub pet_model_id: u32,
    pub pet_level: u32,
    #[serde(default)]
    pub equipment: Vec<EquipmentDisplay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    pub data_type: u32,
    pub time: i64,
}

/// A world server able to host players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServer {
    /// Address game clients are proxied to.
    pub address: String,
    /// Address of the server's control-plane API.
    pub control_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Alliance,
    Horde,
}

impl Team {
    /// Team of a playable race.
    pub fn for_race(race: u8) -> Self {
        // Orc, Undead, Tauren, Troll, Blood Elf
        match race {
            2 | 5 | 6 | 8 | 10 => Team::Horde,
            _ => Team::Alliance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub realm_id: u32,
    pub leader_guid: u64,
    pub party_members: Vec<u64>,
    pub leader_level: u8,
    pub bg_type_id: u32,
    pub team: Team,
}

/// Battleground assigned to a queued player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedBattleground {
    pub instance_id: u32,
    pub map_id: u32,
    pub game_server_address: String,
    pub control_address: String,
    /// Non-zero when the instance is shared between realms.
    pub battlegroup_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSlot {
    pub bg_type_id: u32,
    pub assigned: Option<AssignedBattleground>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: u32,
    pub leader: u64,
    pub members: Vec<u64>,
}

/// A whisper as handed to the chat service, which finds the receiver on
/// whichever gateway they are connected to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperRequest {
    pub realm_id: u32,
    pub sender_guid: u64,
    pub sender_name: String,
    pub sender_race: u8,
    pub language: u32,
    pub receiver_name: String,
    pub message: String,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, ServiceError>;
}

#[async_trait]
pub trait CharacterService: Send + Sync {
    async fn characters_for_account(&self, realm_id: u32, account_id: u32) -> Result<Vec<Character>, ServiceError>;
    async fn character_by_guid(&self, realm_id: u32, guid: u64) -> Result<Option<Character>, ServiceError>;
    async fn account_data_times(&self, realm_id: u32, account_id: u32) -> Result<Vec<AccountData>, ServiceError>;
}

#[async_trait]
pub trait ServersRegistry: Send + Sync {
    async fn available_servers_for_map(&self, realm_id: u32, map_id: u32) -> Result<Vec<GameServer>, ServiceError>;
    async fn random_server(&self, realm_id: u32) -> Result<Option<GameServer>, ServiceError>;
    async fn register_gateway(&self, address: &str, realm_id: u32) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait MatchmakingService: Send + Sync {
    async fn enqueue_to_battleground(&self, request: EnqueueRequest) -> Result<(), ServiceError>;
    async fn remove_from_queue(&self, realm_id: u32, guid: u64, bg_type_id: u32) -> Result<(), ServiceError>;
    async fn queue_data_for_player(&self, realm_id: u32, guid: u64) -> Result<Vec<QueueSlot>, ServiceError>;
    async fn player_joined_battleground(
        &self,
        realm_id: u32,
        guid: u64,
        instance_id: u32,
        is_cross_realm: bool,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait GroupService: Send + Sync {
    async fn group_by_member(&self, realm_id: u32, guid: u64) -> Result<Option<Group>, ServiceError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Delivers a whisper. Returns the receiver's guid, or `None` when no
    /// character by that name is online.
    async fn send_whisper(&self, request: WhisperRequest) -> Result<Option<u64>, ServiceError>;
}
