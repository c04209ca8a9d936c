//! End-to-end tests over real TCP connections.

use crate::auth::handshake::tests::{auth_session_frame, challenge_seed, client_codec, SESSION_KEY};
use crate::config::GatewayConfig;
use crate::crypto::SessionCipher;
use crate::endpoint::BackendConnector;
use crate::protocol::{Frame, FrameCodec, Opcode, Source};
use crate::registry::BackendRegistry;
use crate::server::GatewayServer;
use crate::services::testing::{
    FakeAccounts, FakeBackendConnector, FakeCharacters, FakeChat, FakeControlPlaneConnector, FakeGroups,
    FakeMatchmaking, FakeServersRegistry,
};
use crate::services::Character;
use crate::session::{HandlerTables, SessionDeps};
use futures_util::{SinkExt, StreamExt};
use gateway_events::{ChannelEventsProducer, CharactersUpdatesBarrier, EventBroadcaster, ShutdownState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

const ACCOUNT: &str = "ARTHAS";

fn deps(characters: FakeCharacters) -> SessionDeps {
    let producer = Arc::new(ChannelEventsProducer::new(16));
    let (barrier, _worker) = CharactersUpdatesBarrier::new(producer.clone(), 1, Duration::from_secs(1));
    let (connector, _backends) = FakeBackendConnector::new();
    let connector: Arc<dyn BackendConnector> = Arc::new(connector);
    SessionDeps {
        characters: Arc::new(characters),
        servers: Arc::new(FakeServersRegistry::default()),
        matchmaking: Arc::new(FakeMatchmaking::default()),
        groups: Arc::new(FakeGroups::default()),
        chat: Arc::new(FakeChat::default()),
        registry: Arc::new(BackendRegistry::new(Arc::new(FakeControlPlaneConnector::default()))),
        connector,
        broadcaster: EventBroadcaster::new(),
        producer,
        barrier,
        tables: HandlerTables::new(),
        settings: Default::default(),
    }
}

struct RunningGateway {
    address: std::net::SocketAddr,
    shutdown: ShutdownState,
    task: JoinHandle<()>,
}

impl RunningGateway {
    async fn start(config: GatewayConfig, characters: FakeCharacters) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accounts = Arc::new(FakeAccounts::with_account(3, ACCOUNT, SESSION_KEY.to_vec()));
        let server = GatewayServer::new(config, accounts, deps(characters));
        let shutdown = ShutdownState::new();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            server.serve(listener, serve_shutdown).await.unwrap();
        });
        Self { address, shutdown, task }
    }

    async fn connect(&self) -> Framed<TcpStream, FrameCodec> {
        Framed::new(TcpStream::connect(self.address).await.unwrap(), client_codec())
    }

    async fn stop(self) {
        self.shutdown.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("server stopped in time")
            .unwrap();
    }
}

async fn next_frame(client: &mut Framed<TcpStream, FrameCodec>) -> Option<Frame> {
    tokio::time::timeout(Duration::from_secs(1), client.next())
        .await
        .expect("frame in time")
        .map(|frame| frame.unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_authenticated_client_lists_characters() {
    let characters = FakeCharacters::with_character(Character {
        guid: 10,
        account_id: 3,
        name: "Jaina".into(),
        level: 80,
        ..Default::default()
    });
    let gateway = RunningGateway::start(GatewayConfig::default(), characters).await;
    let mut client = gateway.connect().await;

    let challenge = next_frame(&mut client).await.unwrap();
    let seed = challenge_seed(&challenge);
    client.send(auth_session_frame(ACCOUNT, &seed, &SESSION_KEY, &[0, 0, 0, 0])).await.unwrap();
    client.codec_mut().set_cipher(SessionCipher::client(&SESSION_KEY).unwrap());

    assert_eq!(next_frame(&mut client).await.unwrap().opcode, Opcode::SMSG_AUTH_RESPONSE);
    // An empty addon block gets no addon info.
    assert_eq!(next_frame(&mut client).await.unwrap().opcode, Opcode::SMSG_TUTORIAL_FLAGS);

    client.send(Frame::new(Opcode::CMSG_CHAR_ENUM, Vec::new(), Source::Client)).await.unwrap();
    let list = next_frame(&mut client).await.unwrap();
    assert_eq!(list.opcode, Opcode::SMSG_CHAR_ENUM);
    let mut r = list.reader();
    assert_eq!(r.u8(), Ok(1));
    assert_eq!(r.u64(), Ok(10));
    assert_eq!(r.cstring(), Ok("Jaina".to_string()));

    // Shutdown ends the session, which closes the client connection.
    gateway.stop().await;
    assert!(next_frame(&mut client).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_digest_closes_without_response() {
    let gateway = RunningGateway::start(GatewayConfig::default(), FakeCharacters::default()).await;
    let mut client = gateway.connect().await;

    let challenge = next_frame(&mut client).await.unwrap();
    let seed = challenge_seed(&challenge);
    client.send(auth_session_frame(ACCOUNT, &seed, &[0x11; 40], &[0, 0, 0, 0])).await.unwrap();

    assert!(next_frame(&mut client).await.is_none());
    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connections_over_limit_are_rejected() {
    let config = GatewayConfig { max_connections: 0, ..GatewayConfig::default() };
    let gateway = RunningGateway::start(config, FakeCharacters::default()).await;
    let mut client = gateway.connect().await;

    assert!(next_frame(&mut client).await.is_none());
    gateway.stop().await;
}
