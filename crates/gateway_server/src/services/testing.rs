//! In-memory service fakes for tests.

use super::{
    Account, AccountData, AccountRepository, Character, CharacterService, ChatService, EnqueueRequest, GameServer,
    Group, GroupService, MatchmakingService, QueueSlot, ServersRegistry, ServiceError, WhisperRequest,
};
use crate::endpoint::{BackendConnector, Endpoint, EndpointError, EndpointKind, EndpointPeer};
use crate::protocol::Frame;
use crate::registry::{AddPlayersRequest, ControlPlaneClient, ControlPlaneConnector};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct FakeAccounts {
    accounts: HashMap<String, Account>,
}

impl FakeAccounts {
    pub fn with_account(id: u32, username: &str, session_key: Vec<u8>) -> Self {
        let account = Account { id, username: username.to_string(), session_key };
        Self { accounts: HashMap::from([(username.to_string(), account)]) }
    }
}

#[async_trait]
impl AccountRepository for FakeAccounts {
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, ServiceError> {
        Ok(self.accounts.get(username).cloned())
    }
}

#[derive(Default)]
pub struct FakeCharacters {
    characters: Mutex<HashMap<u64, Character>>,
    account_data: Mutex<Vec<AccountData>>,
}

impl FakeCharacters {
    pub fn with_character(character: Character) -> Self {
        let fake = Self::default();
        fake.put(character);
        fake
    }

    pub fn put(&self, character: Character) {
        self.characters.lock().unwrap().insert(character.guid, character);
    }

    pub fn set_account_data(&self, data: Vec<AccountData>) {
        *self.account_data.lock().unwrap() = data;
    }
}

#[async_trait]
impl CharacterService for FakeCharacters {
    async fn characters_for_account(&self, _realm_id: u32, account_id: u32) -> Result<Vec<Character>, ServiceError> {
        let mut characters: Vec<Character> = self
            .characters
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        characters.sort_by_key(|c| c.guid);
        Ok(characters)
    }

    async fn character_by_guid(&self, _realm_id: u32, guid: u64) -> Result<Option<Character>, ServiceError> {
        Ok(self.characters.lock().unwrap().get(&guid).cloned())
    }

    async fn account_data_times(&self, _realm_id: u32, _account_id: u32) -> Result<Vec<AccountData>, ServiceError> {
        Ok(self.account_data.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeServersRegistry {
    by_map: Mutex<HashMap<u32, Vec<GameServer>>>,
    random: Mutex<Option<GameServer>>,
    registered: Mutex<Vec<(String, u32)>>,
}

impl FakeServersRegistry {
    pub fn set_servers(&self, map_id: u32, servers: Vec<GameServer>) {
        self.by_map.lock().unwrap().insert(map_id, servers);
    }

    pub fn set_random(&self, server: Option<GameServer>) {
        *self.random.lock().unwrap() = server;
    }

    pub fn registered(&self) -> Vec<(String, u32)> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServersRegistry for FakeServersRegistry {
    async fn available_servers_for_map(&self, _realm_id: u32, map_id: u32) -> Result<Vec<GameServer>, ServiceError> {
        Ok(self.by_map.lock().unwrap().get(&map_id).cloned().unwrap_or_default())
    }

    async fn random_server(&self, _realm_id: u32) -> Result<Option<GameServer>, ServiceError> {
        Ok(self.random.lock().unwrap().clone())
    }

    async fn register_gateway(&self, address: &str, realm_id: u32) -> Result<(), ServiceError> {
        self.registered.lock().unwrap().push((address.to_string(), realm_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMatchmaking {
    enqueued: Mutex<Vec<EnqueueRequest>>,
    removed: Mutex<Vec<(u64, u32)>>,
    slots: Mutex<Vec<QueueSlot>>,
    joined: Mutex<Vec<(u64, u32, bool)>>,
    fail_enqueue: AtomicBool,
}

impl FakeMatchmaking {
    pub fn enqueued(&self) -> Vec<EnqueueRequest> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<(u64, u32)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn joined(&self) -> Vec<(u64, u32, bool)> {
        self.joined.lock().unwrap().clone()
    }

    pub fn set_slots(&self, slots: Vec<QueueSlot>) {
        *self.slots.lock().unwrap() = slots;
    }

    pub fn fail_enqueue(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MatchmakingService for FakeMatchmaking {
    async fn enqueue_to_battleground(&self, request: EnqueueRequest) -> Result<(), ServiceError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("matchmaking".to_string()));
        }
        self.enqueued.lock().unwrap().push(request);
        Ok(())
    }

    async fn remove_from_queue(&self, _realm_id: u32, guid: u64, bg_type_id: u32) -> Result<(), ServiceError> {
        self.removed.lock().unwrap().push((guid, bg_type_id));
        Ok(())
    }

    async fn queue_data_for_player(&self, _realm_id: u32, _guid: u64) -> Result<Vec<QueueSlot>, ServiceError> {
        Ok(self.slots.lock().unwrap().clone())
    }

    async fn player_joined_battleground(
        &self,
        _realm_id: u32,
        guid: u64,
        instance_id: u32,
        is_cross_realm: bool,
    ) -> Result<(), ServiceError> {
        self.joined.lock().unwrap().push((guid, instance_id, is_cross_realm));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGroups {
    groups: Mutex<Vec<Group>>,
}

impl FakeGroups {
    pub fn add(&self, group: Group) {
        self.groups.lock().unwrap().push(group);
    }
}

#[async_trait]
impl GroupService for FakeGroups {
    async fn group_by_member(&self, _realm_id: u32, guid: u64) -> Result<Option<Group>, ServiceError> {
        Ok(self.groups.lock().unwrap().iter().find(|g| g.members.contains(&guid)).cloned())
    }
}

/// Chat service that knows a fixed set of online characters.
#[derive(Default)]
pub struct FakeChat {
    online: Mutex<HashMap<String, u64>>,
    whispers: Mutex<Vec<WhisperRequest>>,
}

impl FakeChat {
    pub fn set_online(&self, name: &str, guid: u64) {
        self.online.lock().unwrap().insert(name.to_string(), guid);
    }

    pub fn whispers(&self) -> Vec<WhisperRequest> {
        self.whispers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn send_whisper(&self, request: WhisperRequest) -> Result<Option<u64>, ServiceError> {
        let receiver = self.online.lock().unwrap().get(&request.receiver_name).copied();
        self.whispers.lock().unwrap().push(request);
        Ok(receiver)
    }
}

pub struct FakeControlPlane {
    allow_queue: AtomicBool,
    added: Mutex<Vec<AddPlayersRequest>>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self { allow_queue: AtomicBool::new(true), added: Mutex::new(Vec::new()) }
    }
}

impl FakeControlPlane {
    pub fn deny_queue(&self) {
        self.allow_queue.store(false, Ordering::SeqCst);
    }

    pub fn added(&self) -> Vec<AddPlayersRequest> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlaneClient for FakeControlPlane {
    async fn can_player_join_battleground_queue(&self, _guid: u64) -> Result<bool, ServiceError> {
        Ok(self.allow_queue.load(Ordering::SeqCst))
    }

    async fn add_players_to_battleground(&self, request: AddPlayersRequest) -> Result<(), ServiceError> {
        self.added.lock().unwrap().push(request);
        Ok(())
    }
}

/// Hands out one [`FakeControlPlane`] per control address.
#[derive(Default)]
pub struct FakeControlPlaneConnector {
    connected: tokio::sync::Mutex<Vec<String>>,
    failures: tokio::sync::Mutex<usize>,
    planes: Mutex<HashMap<String, Arc<FakeControlPlane>>>,
}

impl FakeControlPlaneConnector {
    pub async fn connected_addresses(&self) -> Vec<String> {
        self.connected.lock().await.clone()
    }

    /// Makes the next `count` connects fail.
    pub async fn fail_next(&self, count: usize) {
        *self.failures.lock().await = count;
    }

    /// The plane behind `control_address`, created on first use.
    pub fn plane(&self, control_address: &str) -> Arc<FakeControlPlane> {
        self.planes
            .lock()
            .unwrap()
            .entry(control_address.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ControlPlaneConnector for FakeControlPlaneConnector {
    async fn connect(&self, control_address: &str) -> Result<Arc<dyn ControlPlaneClient>, ServiceError> {
        {
            let mut failures = self.failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(ServiceError::Unavailable(control_address.to_string()));
            }
        }
        self.connected.lock().await.push(control_address.to_string());
        Ok(self.plane(control_address))
    }
}

/// The world server side of a connection opened by [`FakeBackendConnector`].
/// Dropping it closes the connection.
pub struct FakeBackend {
    pub address: String,
    pub peer: EndpointPeer,
}

impl FakeBackend {
    /// Next frame the gateway wrote, failing the test after a second.
    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(1), self.peer.from_endpoint.recv())
            .await
            .expect("backend frame in time")
            .expect("backend connection open")
    }

    pub async fn send(&self, frame: Frame) {
        self.peer.to_endpoint.send(frame).await.expect("gateway reads backend");
    }
}

/// Connects channel-backed endpoints and passes their far side to the test.
pub struct FakeBackendConnector {
    backends: mpsc::UnboundedSender<FakeBackend>,
    refused: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl FakeBackendConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeBackend>) {
        let (backends, receiver) = mpsc::unbounded_channel();
        let connector = Self {
            backends,
            refused: Mutex::new(HashSet::new()),
            attempts: Mutex::new(Vec::new()),
        };
        (connector, receiver)
    }

    pub fn refuse(&self, address: &str) {
        self.refused.lock().unwrap().insert(address.to_string());
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendConnector for FakeBackendConnector {
    async fn connect(&self, address: &str) -> Result<Endpoint, EndpointError> {
        self.attempts.lock().unwrap().push(address.to_string());
        if self.refused.lock().unwrap().contains(address) {
            return Err(EndpointError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        let (endpoint, peer) = Endpoint::channel_pair(address, EndpointKind::Backend);
        // The test may have stopped listening; the endpoint then sees a closed peer.
        let _ = self.backends.send(FakeBackend { address: address.to_string(), peer });
        Ok(endpoint)
    }
}
