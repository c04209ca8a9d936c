//! Per-player session routing.
//!
//! A [`GameSession`] is created once a client authenticates and lives until the
//! client disconnects. It owns the client [`Endpoint`] and, while a character
//! is in the world, the endpoint of the world server hosting it. One dispatch
//! loop consumes, one item at a time:
//!
//! 1. closures posted to the session's mutation mailbox,
//! 2. frames from the client,
//! 3. frames from the world server,
//! 4. events addressed to the logged-in character.
//!
//! Frames with a registered handler run it under a deadline; all other frames
//! are forwarded to the opposite endpoint, or dropped if there is none.

mod battleground;
mod character;
mod chat;
pub mod error;
mod events;
mod redirect;
mod router;
pub mod table;
mod world;


pub use error::{RedirectError, SessionError, WorldConnectError};
pub use table::{EventHandler, HandlerChain, HandlerFuture, HandlerTables, PacketHandler};
pub use world::{connect_to_world, connect_to_world_as, WorldConnection, WorldTarget};

use crate::config::SessionSettings;
use crate::endpoint::{BackendConnector, Endpoint};
use crate::protocol::{packets, Frame};
use crate::registry::BackendRegistry;
use crate::services::{Character, CharacterService, ChatService, GroupService, MatchmakingService, ServersRegistry};
use gateway_events::{CharactersUpdatesBarrier, EventBroadcaster, EventsProducer, GatewayEvent};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of a session's mutation mailbox.
pub const MUTATION_QUEUE_CAPACITY: usize = 100;

/// Work run on the session's own task with exclusive access to it.
pub type Mutation = Box<dyn FnOnce(&mut GameSession) + Send>;

/// Everything a session needs besides its own connections, shared by all
/// sessions of the gateway.
pub struct SessionDeps {
    pub characters: Arc<dyn CharacterService>,
    pub servers: Arc<dyn ServersRegistry>,
    pub matchmaking: Arc<dyn MatchmakingService>,
    pub groups: Arc<dyn GroupService>,
    pub chat: Arc<dyn ChatService>,
    pub registry: Arc<BackendRegistry>,
    pub connector: Arc<dyn BackendConnector>,
    pub broadcaster: EventBroadcaster,
    pub producer: Arc<dyn EventsProducer>,
    pub barrier: CharactersUpdatesBarrier,
    pub tables: HandlerTables,
    pub settings: SessionSettings,
}

/// Deadline and cancellation scope of one handler invocation.
///
/// Clones share the deadline. A handler that starts a long protocol exchange,
/// such as a redirect, pushes it back with [`HandlerContext::extend`].
#[derive(Debug, Clone)]
pub struct HandlerContext {
    deadline: Arc<Mutex<tokio::time::Instant>>,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(timeout: Duration, parent: &CancellationToken) -> Self {
        Self {
            deadline: Arc::new(Mutex::new(tokio::time::Instant::now() + timeout)),
            cancel: parent.child_token(),
        }
    }

    pub fn deadline(&self) -> tokio::time::Instant {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gives the handler at least `budget` from now. Never shortens the
    /// deadline.
    pub fn extend(&self, budget: Duration) {
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        *deadline = (*deadline).max(tokio::time::Instant::now() + budget);
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Runs `future` until it completes, the deadline passes or the session is
    /// cancelled. `None` means it did not complete.
    pub async fn bounded<F: std::future::Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.within(Duration::ZERO, future) => result,
        }
    }

    /// Runs `future` until it completes or `grace` after the deadline,
    /// following extensions made while it runs.
    pub(crate) async fn within<F: std::future::Future>(&self, grace: Duration, future: F) -> Option<F::Output> {
        tokio::pin!(future);
        loop {
            let limit = self.deadline() + grace;
            tokio::select! {
                output = &mut future => return Some(output),
                _ = tokio::time::sleep_until(limit) => {
                    if self.deadline() + grace <= limit {
                        return None;
                    }
                }
            }
        }
    }
}

/// Handle for posting [`Mutation`]s from outside the session task.
#[derive(Clone)]
pub struct MutationSender {
    sender: mpsc::Sender<Mutation>,
}

impl MutationSender {
    /// Queues `mutation`. Returns `false` if the session has ended.
    pub async fn post(&self, mutation: impl FnOnce(&mut GameSession) + Send + 'static) -> bool {
        self.sender.send(Box::new(mutation)).await.is_ok()
    }
}

/// Crash recovery progress of the logged-in character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    Idle,
    Running,
    Exhausted,
}

/// Invite events may overtake the queue confirmation they follow; the invite
/// is held back until the confirmation was sent.
#[derive(Debug, Default)]
pub(crate) struct InviteOrdering {
    pub waiting_join_to_queue: bool,
    pub pending_invite: Option<Frame>,
}

/// The character a session has in the world.
#[derive(Debug)]
pub(crate) struct SessionCharacter {
    pub record: Character,
    /// Map of a transfer the gateway arranged itself, whose SMSG_NEW_WORLD must
    /// not trigger a redirect.
    pub ignore_next_new_world: Option<u32>,
    /// The world server manages the group while the character is in a
    /// battleground.
    pub group_managed_by_game_server: bool,
    pub invites: InviteOrdering,
    pub recovery: Recovery,
}

impl SessionCharacter {
    fn new(record: Character) -> Self {
        Self {
            record,
            ignore_next_new_world: None,
            group_managed_by_game_server: false,
            invites: InviteOrdering::default(),
            recovery: Recovery::Idle,
        }
    }

    pub fn guid(&self) -> u64 {
        self.record.guid
    }
}

/// Server messages forwarded at most once per session.
#[derive(Debug, Default)]
pub(crate) struct SentOnce {
    pub motd: bool,
    pub account_data_global: bool,
    pub account_data_per_character: bool,
}

pub struct GameSession {
    account_id: u32,
    account_name: String,
    /// Auth request of the client, replayed to every world server.
    auth_frame: Frame,
    client: Endpoint,
    backend: Option<Endpoint>,
    character: Option<SessionCharacter>,
    teleporting_to_map: Option<u32>,
    sent: SentOnce,
    group_update_counter: u32,
    ping_started: Option<Instant>,
    events: Option<mpsc::Receiver<GatewayEvent>>,
    mutations: mpsc::Receiver<Mutation>,
    mutation_sender: mpsc::Sender<Mutation>,
    deps: Arc<SessionDeps>,
    cancel: CancellationToken,
}

impl GameSession {
    /// Creates the session of an authenticated client. `cancel` should be a
    /// child of the server's shutdown token.
    pub fn new(
        account_id: u32,
        account_name: impl Into<String>,
        auth_frame: Frame,
        client: Endpoint,
        deps: Arc<SessionDeps>,
        cancel: CancellationToken,
    ) -> Self {
        let (mutation_sender, mutations) = mpsc::channel(MUTATION_QUEUE_CAPACITY);
        Self {
            account_id,
            account_name: account_name.into(),
            auth_frame,
            client,
            backend: None,
            character: None,
            teleporting_to_map: None,
            sent: SentOnce::default(),
            group_update_counter: 0,
            ping_started: None,
            events: None,
            mutations,
            mutation_sender,
            deps,
            cancel,
        }
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn character_guid(&self) -> Option<u64> {
        self.character.as_ref().map(SessionCharacter::guid)
    }

    pub fn backend_address(&self) -> Option<&str> {
        self.backend.as_ref().map(Endpoint::address)
    }

    pub fn mutation_sender(&self) -> MutationSender {
        MutationSender { sender: self.mutation_sender.clone() }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn settings(&self) -> &SessionSettings {
        &self.deps.settings
    }

    pub(crate) fn character(&self) -> Result<&SessionCharacter, SessionError> {
        self.character.as_ref().ok_or(SessionError::NoCharacter)
    }

    pub(crate) fn character_mut(&mut self) -> Result<&mut SessionCharacter, SessionError> {
        self.character.as_mut().ok_or(SessionError::NoCharacter)
    }

    pub(crate) async fn send_to_client(&self, frame: Frame) -> Result<(), SessionError> {
        Ok(self.client.send(frame).await?)
    }

    pub(crate) async fn send_to_backend(&self, frame: Frame) -> Result<(), SessionError> {
        let backend = self.backend.as_ref().ok_or(SessionError::NoBackend)?;
        Ok(backend.send(frame).await?)
    }

    pub(crate) async fn send_system_message(&self, text: &str) -> Result<(), SessionError> {
        self.send_to_client(packets::system_message(text)).await
    }
}
