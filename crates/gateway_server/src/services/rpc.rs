//! JSON-lines RPC client for the gateway's remote services.
//!
//! Every call writes one request envelope `{namespace, event, data}` as a line
//! and reads one reply envelope `{ok, data, error}`. A client keeps a single
//! connection, opened on first use and reopened after a transport failure.

use super::{
    Account, AccountData, AccountRepository, Character, CharacterService, ChatService, EnqueueRequest, GameServer,
    Group, GroupService, MatchmakingService, QueueSlot, ServersRegistry, ServiceError, WhisperRequest,
};
use crate::registry::{AddPlayersRequest, ControlPlaneClient, ControlPlaneConnector};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

/// Longest reply line accepted from a service.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
struct RpcRequest<'a, T> {
    namespace: &'a str,
    event: &'a str,
    data: T,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    ok: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

type Connection = Framed<TcpStream, LinesCodec>;

pub struct JsonRpcClient {
    address: String,
    connection: Mutex<Option<Connection>>,
}

impl JsonRpcClient {
    /// Creates a client that connects on its first call.
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), connection: Mutex::new(None) }
    }

    /// Creates a client and opens its connection right away.
    pub async fn connect(address: impl Into<String>) -> Result<Self, ServiceError> {
        let client = Self::new(address);
        let connection = Self::open(&client.address).await?;
        *client.connection.lock().await = Some(connection);
        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(address: &str) -> Result<Connection, ServiceError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("{address}: {e}")))?;
        stream.set_nodelay(true)?;
        debug!("🔗 Connected to service at {}", address);
        Ok(Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)))
    }

    /// Sends one request and decodes the `data` of its reply.
    pub async fn call<T, R>(&self, namespace: &str, event: &str, data: T) -> Result<R, ServiceError>
    where
        T: Serialize + Send,
        R: DeserializeOwned,
    {
        let line = serde_json::to_string(&RpcRequest { namespace, event, data })?;

        let reply = {
            let mut guard = self.connection.lock().await;
            if guard.is_none() {
                *guard = Some(Self::open(&self.address).await?);
            }
            let Some(connection) = guard.as_mut() else {
                return Err(ServiceError::Closed);
            };

            match Self::exchange(connection, line).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("⚠️ Dropping connection to {}: {}", self.address, e);
                    *guard = None;
                    return Err(e);
                }
            }
        };

        let reply: RpcReply = serde_json::from_str(&reply)?;
        if !reply.ok {
            return Err(ServiceError::Remote {
                namespace: namespace.to_string(),
                event: event.to_string(),
                message: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(serde_json::from_value(reply.data)?)
    }

    async fn exchange(connection: &mut Connection, line: String) -> Result<String, ServiceError> {
        connection.send(line).await?;
        match connection.next().await {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(e.into()),
            None => Err(ServiceError::Closed),
        }
    }
}

#[async_trait]
impl AccountRepository for JsonRpcClient {
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, ServiceError> {
        self.call("accounts", "account_by_username", json!({ "username": username }))
            .await
    }
}

#[async_trait]
impl CharacterService for JsonRpcClient {
    async fn characters_for_account(&self, realm_id: u32, account_id: u32) -> Result<Vec<Character>, ServiceError> {
        self.call(
            "characters",
            "characters_for_account",
            json!({ "realm_id": realm_id, "account_id": account_id }),
        )
        .await
    }

    async fn character_by_guid(&self, realm_id: u32, guid: u64) -> Result<Option<Character>, ServiceError> {
        self.call("characters", "character_by_guid", json!({ "realm_id": realm_id, "guid": guid }))
            .await
    }

    async fn account_data_times(&self, realm_id: u32, account_id: u32) -> Result<Vec<AccountData>, ServiceError> {
        self.call(
            "characters",
            "account_data_times",
            json!({ "realm_id": realm_id, "account_id": account_id }),
        )
        .await
    }
}

#[async_trait]
impl ServersRegistry for JsonRpcClient {
    async fn available_servers_for_map(&self, realm_id: u32, map_id: u32) -> Result<Vec<GameServer>, ServiceError> {
        self.call(
            "servers_registry",
            "available_servers_for_map",
            json!({ "realm_id": realm_id, "map_id": map_id }),
        )
        .await
    }

    async fn random_server(&self, realm_id: u32) -> Result<Option<GameServer>, ServiceError> {
        self.call("servers_registry", "random_server", json!({ "realm_id": realm_id }))
            .await
    }

    async fn register_gateway(&self, address: &str, realm_id: u32) -> Result<(), ServiceError> {
        self.call(
            "servers_registry",
            "register_gateway",
            json!({ "address": address, "realm_id": realm_id }),
        )
        .await
    }
}

#[async_trait]
impl MatchmakingService for JsonRpcClient {
    async fn enqueue_to_battleground(&self, request: EnqueueRequest) -> Result<(), ServiceError> {
        self.call("matchmaking", "enqueue_to_battleground", request).await
    }

    async fn remove_from_queue(&self, realm_id: u32, guid: u64, bg_type_id: u32) -> Result<(), ServiceError> {
        self.call(
            "matchmaking",
            "remove_from_queue",
            json!({ "realm_id": realm_id, "guid": guid, "bg_type_id": bg_type_id }),
        )
        .await
    }

    async fn queue_data_for_player(&self, realm_id: u32, guid: u64) -> Result<Vec<QueueSlot>, ServiceError> {
        self.call("matchmaking", "queue_data_for_player", json!({ "realm_id": realm_id, "guid": guid }))
            .await
    }

    async fn player_joined_battleground(
        &self,
        realm_id: u32,
        guid: u64,
        instance_id: u32,
        is_cross_realm: bool,
    ) -> Result<(), ServiceError> {
        self.call(
            "matchmaking",
            "player_joined_battleground",
            json!({
                "realm_id": realm_id,
                "guid": guid,
                "instance_id": instance_id,
                "is_cross_realm": is_cross_realm,
            }),
        )
        .await
    }
}

#[async_trait]
impl GroupService for JsonRpcClient {
    async fn group_by_member(&self, realm_id: u32, guid: u64) -> Result<Option<Group>, ServiceError> {
        self.call("groups", "group_by_member", json!({ "realm_id": realm_id, "guid": guid }))
            .await
    }
}

#[async_trait]
impl ChatService for JsonRpcClient {
    async fn send_whisper(&self, request: WhisperRequest) -> Result<Option<u64>, ServiceError> {
        self.call("chat", "send_whisper", request).await
    }
}

#[async_trait]
impl ControlPlaneClient for JsonRpcClient {
    async fn can_player_join_battleground_queue(&self, guid: u64) -> Result<bool, ServiceError> {
        self.call("control", "can_player_join_battleground_queue", json!({ "guid": guid }))
            .await
    }

    async fn add_players_to_battleground(&self, request: AddPlayersRequest) -> Result<(), ServiceError> {
        self.call("control", "add_players_to_battleground", request).await
    }
}

/// Opens a [`JsonRpcClient`] per world server control address.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcControlConnector;

#[async_trait]
impl ControlPlaneConnector for JsonRpcControlConnector {
    async fn connect(&self, control_address: &str) -> Result<Arc<dyn ControlPlaneClient>, ServiceError> {
        Ok(Arc::new(JsonRpcClient::connect(control_address).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serves `replies` in order, one per request line, and returns the
    /// requests it received once the client disconnects.
    async fn serve(replies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<serde_json::Value>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = Framed::new(stream, LinesCodec::new());
            let mut requests = Vec::new();
            for reply in replies {
                let Some(Ok(line)) = lines.next().await else { break };
                requests.push(serde_json::from_str(&line).unwrap());
                lines.send(reply).await.unwrap();
            }
            requests
        });
        (address, handle)
    }

    #[tokio::test]
    async fn test_call_sends_envelope_and_decodes_data() {
        let (address, server) = serve(vec![
            r#"{"ok":true,"data":{"id":3,"username":"ARTHAS","session_key":[1,2,3]}}"#,
        ])
        .await;
        let client = JsonRpcClient::new(address);

        let account = client.account_by_username("ARTHAS").await.unwrap().expect("account");
        assert_eq!(account.id, 3);
        assert_eq!(account.session_key, vec![1, 2, 3]);

        drop(client);
        let requests = server.await.unwrap();
        assert_eq!(requests[0]["namespace"], "accounts");
        assert_eq!(requests[0]["event"], "account_by_username");
        assert_eq!(requests[0]["data"]["username"], "ARTHAS");
    }

    #[tokio::test]
    async fn test_null_data_decodes_as_none_and_unit() {
        let (address, _server) = serve(vec![r#"{"ok":true,"data":null}"#, r#"{"ok":true}"#]).await;
        let client = JsonRpcClient::new(address);

        assert!(client.character_by_guid(1, 5).await.unwrap().is_none());
        client.register_gateway("127.0.0.1:8085", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_is_remote_error() {
        let (address, _server) = serve(vec![r#"{"ok":false,"error":"queue is closed"}"#]).await;
        let client = JsonRpcClient::new(address);

        let err = client.remove_from_queue(1, 5, 2).await.unwrap_err();
        match err {
            ServiceError::Remote { namespace, event, message } => {
                assert_eq!(namespace, "matchmaking");
                assert_eq!(event, "remove_from_queue");
                assert_eq!(message, "queue is closed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_whisper_receiver_is_none() {
        let (address, server) = serve(vec![r#"{"ok":true,"data":4242}"#, r#"{"ok":true,"data":null}"#]).await;
        let client = JsonRpcClient::new(address);
        let request = WhisperRequest {
            realm_id: 1,
            sender_guid: 7,
            sender_name: "Jaina".to_string(),
            sender_race: 1,
            language: 7,
            receiver_name: "Thrall".to_string(),
            message: "hello".to_string(),
        };

        assert_eq!(client.send_whisper(request.clone()).await.unwrap(), Some(4242));
        assert_eq!(client.send_whisper(request).await.unwrap(), None);

        drop(client);
        let requests = server.await.unwrap();
        assert_eq!(requests[0]["namespace"], "chat");
        assert_eq!(requests[0]["data"]["receiver_name"], "Thrall");
    }

    #[tokio::test]
    async fn test_closed_connection_is_reopened() {
        // The first server answers nothing and closes.
        let (address, server) = serve(vec![]).await;
        let client = JsonRpcClient::connect(address.clone()).await.unwrap();
        server.await.unwrap();
        assert!(client.random_server(1).await.is_err());

        // Nothing listens anymore, so the reconnect finds the service down.
        match client.random_server(1).await {
            Err(ServiceError::Unavailable(reason)) => assert!(reason.starts_with(&address)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
