//! World server connections and the handlers that watch in-world traffic.

use super::{GameSession, HandlerContext, SessionDeps, SessionError, WorldConnectError};
use crate::endpoint::Endpoint;
use crate::protocol::{packets, Frame, Opcode, PacketWriter, Source};
use crate::services::Character;
use std::time::Instant;
use tracing::{debug, info};

const ACCOUNT_DATA_GLOBAL_MASK: u32 = 0x15;
const ACCOUNT_DATA_PER_CHARACTER_MASK: u32 = 0xEA;

/// Group type flag of SMSG_GROUP_LIST marking a dungeon finder group, which
/// carries 5 more bytes before the group guid.
const GROUP_TYPE_LFG: u8 = 0x08;

/// Where to put a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldTarget {
    /// A world server hosting the character's saved map.
    CharacterMap,
    /// A world server hosting the given map.
    Map(u32),
    /// A specific world server.
    Address(String),
}

/// A character logged in on a freshly opened world server connection.
#[derive(Debug)]
pub struct WorldConnection {
    pub character: Character,
    pub endpoint: Endpoint,
}

/// Opens a world server connection for character `guid`: resolves the server,
/// records its control address, replays the client's auth request and sends
/// the player login.
pub async fn connect_to_world(
    deps: &SessionDeps,
    auth_frame: &Frame,
    guid: u64,
    target: WorldTarget,
) -> Result<WorldConnection, WorldConnectError> {
    connect_to_world_as(deps, auth_frame, guid, guid, target).await
}

/// Like [`connect_to_world`], but logs the character in as `login_guid`,
/// which differs from `guid` on cross-realm servers.
pub async fn connect_to_world_as(
    deps: &SessionDeps,
    auth_frame: &Frame,
    guid: u64,
    login_guid: u64,
    target: WorldTarget,
) -> Result<WorldConnection, WorldConnectError> {
    let realm_id = deps.settings.realm_id;
    let character = deps
        .characters
        .character_by_guid(realm_id, guid)
        .await?
        .ok_or(WorldConnectError::CharacterNotFound(guid))?;

    let address = match target {
        WorldTarget::Address(address) => address,
        WorldTarget::CharacterMap | WorldTarget::Map(_) => {
            let map_id = match target {
                WorldTarget::Map(map_id) => map_id,
                _ => character.map,
            };
            let servers = deps.servers.available_servers_for_map(realm_id, map_id).await?;
            let server = servers.into_iter().next().ok_or(WorldConnectError::NoInstance(map_id))?;
            deps.registry
                .add_address_mapping(&server.address, &server.control_address)
                .await;
            server.address
        }
    };

    debug!("🌍 Connecting character {} to world server {} as {}", guid, address, login_guid);
    let endpoint = deps.connector.connect(&address).await?;
    endpoint.send(auth_frame.clone()).await?;
    // The world server needs a moment to register the session.
    tokio::time::sleep(deps.settings.login_delay).await;
    endpoint.send(packets::player_login(login_guid)).await?;

    Ok(WorldConnection { character, endpoint })
}

impl GameSession {
    pub(crate) async fn reject_auth_session(&mut self, _ctx: HandlerContext, _frame: Frame) -> Result<(), SessionError> {
        Err(SessionError::Protocol(format!(
            "account {} sent a second auth session request",
            self.account_id
        )))
    }

    pub(crate) async fn handle_realm_split(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let unk = frame.reader().u32()?;
        self.send_to_client(packets::realm_split(unk)).await
    }

    pub(crate) async fn handle_ready_for_account_data_times(
        &mut self,
        _ctx: HandlerContext,
        _frame: Frame,
    ) -> Result<(), SessionError> {
        let data = self
            .deps
            .characters
            .account_data_times(self.settings().realm_id, self.account_id)
            .await?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let reply = packets::account_data_times(now, ACCOUNT_DATA_GLOBAL_MASK, |data_type| {
            data.iter()
                .find(|d| d.data_type == data_type)
                .map(|d| d.time as u32)
                .unwrap_or_default()
        });
        self.send_to_client(reply).await?;
        self.sent.account_data_global = true;
        Ok(())
    }

    pub(crate) async fn handle_ping(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        self.ping_started = Some(Instant::now());
        if self.backend.is_some() {
            return self.send_to_backend(frame).await;
        }
        let sequence = frame.reader().u32()?;
        self.send_to_client(packets::pong(sequence)).await
    }

    pub(crate) async fn intercept_pong(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        if let Some(started) = self.ping_started.take() {
            info!("📶 Latency with world server for account {}: {:?}", self.account_id, started.elapsed());
        }
        self.send_to_client(frame).await
    }

    pub(crate) async fn intercept_new_world(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let map_id = frame.reader().u32()?;
        let ignored = self
            .character
            .as_ref()
            .is_some_and(|c| c.ignore_next_new_world == Some(map_id));
        if !ignored {
            self.teleporting_to_map = Some(map_id);
        }
        self.send_to_client(frame).await
    }

    /// Completes a teleport, moving the player to the world server of the new
    /// map when it is not the current one.
    pub(crate) async fn handle_worldport_ack(&mut self, ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        self.send_to_backend(frame).await?;

        let Some(map_id) = self.teleporting_to_map.take() else {
            return Ok(());
        };
        let character = self.character_mut()?;
        character.ignore_next_new_world = None;
        // Leaving a battleground hands the group back to the gateway.
        character.group_managed_by_game_server = false;
        let guid = character.guid();

        let servers = self
            .deps
            .servers
            .available_servers_for_map(self.settings().realm_id, map_id)
            .await?;
        let server = servers.into_iter().next().ok_or(WorldConnectError::NoInstance(map_id))?;
        self.deps
            .registry
            .add_address_mapping(&server.address, &server.control_address)
            .await;

        if self.backend_address() == Some(server.address.as_str()) {
            return Ok(());
        }
        self.redirect(&ctx, guid, guid, WorldTarget::Map(map_id), &server.address).await
    }

    pub(crate) async fn intercept_motd(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        if self.sent.motd {
            return Ok(());
        }
        self.sent.motd = true;
        self.send_to_client(frame).await
    }

    /// Every world server the player visits announces account data times;
    /// the client only needs the first announcement of each kind.
    pub(crate) async fn intercept_account_data_times(
        &mut self,
        _ctx: HandlerContext,
        frame: Frame,
    ) -> Result<(), SessionError> {
        let mut r = frame.reader();
        let _unix_time = r.u32()?;
        let _flag = r.u8()?;
        let mask = r.u32()?;

        let sent = match mask {
            ACCOUNT_DATA_GLOBAL_MASK => Some(&mut self.sent.account_data_global),
            ACCOUNT_DATA_PER_CHARACTER_MASK => Some(&mut self.sent.account_data_per_character),
            _ => None,
        };
        if let Some(sent) = sent {
            if *sent {
                return Ok(());
            }
            *sent = true;
        }
        self.send_to_client(frame).await
    }

    pub(crate) async fn intercept_init_world_states(
        &mut self,
        _ctx: HandlerContext,
        frame: Frame,
    ) -> Result<(), SessionError> {
        self.send_to_client(frame.clone()).await?;

        let mut r = frame.reader();
        let map_id = r.u32()?;
        let zone_id = r.u32()?;
        let area_id = r.u32()?;

        let barrier = self.deps.barrier.clone();
        let character = self.character_mut()?;
        let guid = character.guid();
        if character.record.map != map_id {
            character.record.map = map_id;
            barrier.update_map(guid, map_id).await;
        }
        if character.record.zone != zone_id {
            character.record.zone = zone_id;
            barrier.update_zone(guid, area_id, zone_id).await;
        }
        Ok(())
    }

    pub(crate) async fn intercept_levelup_info(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        self.send_to_client(frame.clone()).await?;

        let level = frame.reader().u32()? as u8;
        let barrier = self.deps.barrier.clone();
        let character = self.character_mut()?;
        if character.record.level != level {
            character.record.level = level;
            barrier.update_level(character.guid(), level).await;
        }
        Ok(())
    }

    /// Rewrites the update counter of SMSG_GROUP_LIST. Each world server counts
    /// from its own start, but the client ignores lists older than the last one
    /// it saw, so the session keeps one counter across servers.
    pub(crate) async fn intercept_group_list(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let group_type = frame.reader().u8()?;
        let mut offset = 4 + 8;
        if group_type & GROUP_TYPE_LFG != 0 {
            offset += 5;
        }
        if frame.size() < offset + 4 {
            return Err(SessionError::Invalid(format!("group list of {} bytes is too short", frame.size())));
        }

        self.group_update_counter = self.group_update_counter.wrapping_add(1);
        let payload = frame.payload.as_ref();
        let mut w = PacketWriter::with_capacity(Opcode::SMSG_GROUP_LIST, payload.len());
        w.bytes(&payload[..offset])
            .u32(self.group_update_counter)
            .bytes(&payload[offset + 4..]);
        self.send_to_client(w.finish(Source::Backend)).await
    }
}
