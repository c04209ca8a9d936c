//! Dispatch tables of the session router.
//!
//! Tables are built once at startup and shared by every session. A packet
//! handler is keyed by the side the frame came from and its opcode; an event
//! handler by the event kind. Each entry is a named chain of handlers that run
//! in order until one fails.

use super::{GameSession, HandlerContext, SessionError};
use crate::protocol::{Frame, Opcode, Source};
use gateway_events::{EventKind, GatewayEvent};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;

pub type PacketHandler = for<'a> fn(&'a mut GameSession, HandlerContext, Frame) -> HandlerFuture<'a>;

pub type EventHandler = for<'a> fn(&'a mut GameSession, HandlerContext, GatewayEvent) -> HandlerFuture<'a>;

/// Handlers run in sequence for one opcode or event kind.
#[derive(Clone)]
pub struct HandlerChain<H> {
    name: &'static str,
    handlers: Vec<H>,
}

impl<H: Copy> HandlerChain<H> {
    pub fn new(name: &'static str, first: H) -> Self {
        Self { name, handlers: vec![first] }
    }

    pub fn then(mut self, handler: H) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl HandlerChain<PacketHandler> {
    pub(crate) async fn run(&self, session: &mut GameSession, ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        for handler in &self.handlers {
            handler(session, ctx.clone(), frame.clone()).await?;
        }
        Ok(())
    }
}

impl HandlerChain<EventHandler> {
    pub(crate) async fn run(
        &self,
        session: &mut GameSession,
        ctx: HandlerContext,
        event: GatewayEvent,
    ) -> Result<(), SessionError> {
        for handler in &self.handlers {
            handler(session, ctx.clone(), event.clone()).await?;
        }
        Ok(())
    }
}

pub struct HandlerTables {
    packets: HashMap<(Source, Opcode), HandlerChain<PacketHandler>>,
    events: HashMap<EventKind, HandlerChain<EventHandler>>,
}

macro_rules! packet_handlers {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            fn $name<'a>(session: &'a mut GameSession, ctx: HandlerContext, frame: Frame) -> HandlerFuture<'a> {
                Box::pin(session.$method(ctx, frame))
            }
        )*
    };
}

macro_rules! event_handlers {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            fn $name<'a>(session: &'a mut GameSession, ctx: HandlerContext, event: GatewayEvent) -> HandlerFuture<'a> {
                Box::pin(session.$method(ctx, event))
            }
        )*
    };
}

packet_handlers! {
    reject_auth_session => reject_auth_session,
    char_enum => handle_char_enum,
    char_create => handle_char_create,
    char_delete => handle_char_delete,
    player_login => handle_player_login,
    realm_split => handle_realm_split,
    ready_for_account_data_times => handle_ready_for_account_data_times,
    ping => handle_ping,
    worldport_ack => handle_worldport_ack,
    battlemaster_join => handle_battlemaster_join,
    battlefield_port => handle_battlefield_port,
    message_chat => handle_message_chat,
    pong => intercept_pong,
    new_world => intercept_new_world,
    motd => intercept_motd,
    account_data_times => intercept_account_data_times,
    init_world_states => intercept_init_world_states,
    levelup_info => intercept_levelup_info,
    group_list => intercept_group_list,
}

event_handlers! {
    incoming_whisper => handle_incoming_whisper,
    bg_joined_queue => handle_bg_joined_queue,
    bg_invited => handle_bg_invited,
    bg_invite_expired => handle_bg_invite_expired,
    bg_status_changed => handle_bg_status_changed,
}

fn event_chain(kind: EventKind) -> Option<HandlerChain<EventHandler>> {
    let handler: EventHandler = match kind {
        EventKind::BattlegroundJoinedQueue => bg_joined_queue,
        EventKind::BattlegroundInvited => bg_invited,
        EventKind::BattlegroundInviteExpired => bg_invite_expired,
        EventKind::BattlegroundStatusChanged => bg_status_changed,
        EventKind::IncomingWhisper => incoming_whisper,
        // Group state reaches the client in the world server's SMSG_GROUP_LIST.
        EventKind::GroupUpdated => return None,
    };
    Some(HandlerChain::new(kind.name(), handler))
}

impl HandlerTables {
    /// The gateway's handler tables.
    pub fn new() -> Self {
        let mut tables = Self::empty();

        let client: [(Opcode, &'static str, PacketHandler); 12] = [
            (Opcode::CMSG_AUTH_SESSION, "CMsgAuthSession", reject_auth_session),
            (Opcode::CMSG_CHAR_ENUM, "CMsgCharEnum", char_enum),
            (Opcode::CMSG_CHAR_CREATE, "CMsgCharCreate", char_create),
            (Opcode::CMSG_CHAR_DELETE, "CMsgCharDelete", char_delete),
            (Opcode::CMSG_PLAYER_LOGIN, "CMsgPlayerLogin", player_login),
            (Opcode::CMSG_REALM_SPLIT, "CMsgRealmSplit", realm_split),
            (Opcode::CMSG_READY_FOR_ACCOUNT_DATA_TIMES, "CMsgReadyForAccountDataTimes", ready_for_account_data_times),
            (Opcode::CMSG_PING, "CMsgPing", ping),
            (Opcode::MSG_MOVE_WORLDPORT_ACK, "MsgMoveWorldPortAck", worldport_ack),
            (Opcode::CMSG_BATTLEMASTER_JOIN, "CMsgBattlemasterJoin", battlemaster_join),
            (Opcode::CMSG_BATTLEFIELD_PORT, "CMsgBattlefieldPort", battlefield_port),
            (Opcode::CMSG_MESSAGECHAT, "CMsgMessageChat", message_chat),
        ];
        for (opcode, name, handler) in client {
            tables = tables.with_packet_handler(Source::Client, opcode, HandlerChain::new(name, handler));
        }

        let backend: [(Opcode, &'static str, PacketHandler); 7] = [
            (Opcode::SMSG_PONG, "SMsgPong", pong),
            (Opcode::SMSG_NEW_WORLD, "SMsgNewWorld", new_world),
            (Opcode::SMSG_MOTD, "SMsgMotd", motd),
            (Opcode::SMSG_ACCOUNT_DATA_TIMES, "SMsgAccountDataTimes", account_data_times),
            (Opcode::SMSG_INIT_WORLD_STATES, "SMsgInitWorldStates", init_world_states),
            (Opcode::SMSG_LEVELUP_INFO, "SMsgLevelUpInfo", levelup_info),
            (Opcode::SMSG_GROUP_LIST, "SMsgGroupList", group_list),
        ];
        for (opcode, name, handler) in backend {
            tables = tables.with_packet_handler(Source::Backend, opcode, HandlerChain::new(name, handler));
        }

        tables.events = EventKind::ALL
            .iter()
            .filter_map(|kind| event_chain(*kind).map(|chain| (*kind, chain)))
            .collect();
        tables
    }

    /// Tables with no handlers: every frame is forwarded, every event dropped.
    pub fn empty() -> Self {
        Self { packets: HashMap::new(), events: HashMap::new() }
    }

    pub fn with_packet_handler(mut self, source: Source, opcode: Opcode, chain: HandlerChain<PacketHandler>) -> Self {
        self.packets.insert((source, opcode), chain);
        self
    }

    pub fn packet_handler(&self, source: Source, opcode: Opcode) -> Option<&HandlerChain<PacketHandler>> {
        self.packets.get(&(source, opcode))
    }

    pub fn event_handler(&self, kind: EventKind) -> Option<&HandlerChain<EventHandler>> {
        self.events.get(&kind)
    }
}

impl Default for HandlerTables {
    fn default() -> Self {
        Self::new()
    }
}
