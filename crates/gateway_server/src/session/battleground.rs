//! Battleground queueing and entry.

use super::{GameSession, HandlerContext, SessionError, WorldTarget};
use crate::protocol::guid::crossrealm_player_guid;
use crate::protocol::{packets, Frame, Opcode};
use crate::registry::AddPlayersRequest;
use crate::services::{EnqueueRequest, Team};
use tracing::{debug, info};

/// SMSG_GROUP_JOINED_BATTLEGROUND result for players who may not queue.
const ERR_GROUP_JOIN_BATTLEGROUND_DESERTERS: i32 = -2;

const PORT_ACTION_LEAVE_QUEUE: u8 = 0;
const PORT_ACTION_ENTER_BATTLE: u8 = 1;

impl GameSession {
    pub(crate) async fn handle_battlemaster_join(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let mut r = frame.reader();
        let _battlemaster = r.u64()?;
        let bg_type_id = r.u32()?;
        let _instance_id = r.u32()?;
        let join_as_group = r.u8()? != 0;

        let realm_id = self.settings().realm_id;
        let (guid, race, level) = {
            let character = &self.character()?.record;
            (character.guid, character.race, character.level)
        };

        let mut party_members = Vec::new();
        if join_as_group {
            let group = self
                .deps
                .groups
                .group_by_member(realm_id, guid)
                .await
                .map_err(|e| SessionError::user_facing("Group service unavailable. Try again later.", e))?;
            if let Some(group) = group {
                party_members = group.members.into_iter().filter(|member| *member != guid).collect();
            }
        }

        let address = self.backend_address().ok_or(SessionError::NoBackend)?.to_string();
        let control = self.deps.registry.client_for(&address).await?;
        let allowed = match control.can_player_join_battleground_queue(guid).await {
            Ok(allowed) => allowed,
            Err(e) => {
                debug!("Queue check for {} failed: {}", guid, e);
                false
            }
        };
        if !allowed {
            return self
                .send_to_client(packets::group_joined_battleground(ERR_GROUP_JOIN_BATTLEGROUND_DESERTERS))
                .await;
        }

        let request = EnqueueRequest {
            realm_id,
            leader_guid: guid,
            party_members,
            leader_level: level,
            bg_type_id,
            team: Team::for_race(race),
        };
        if let Err(e) = self.deps.matchmaking.enqueue_to_battleground(request).await {
            self.send_to_client(packets::group_joined_battleground(ERR_GROUP_JOIN_BATTLEGROUND_DESERTERS))
                .await?;
            return Err(e.into());
        }

        self.character_mut()?.invites.waiting_join_to_queue = true;
        Ok(())
    }

    pub(crate) async fn handle_battlefield_port(&mut self, ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let mut r = frame.reader();
        let _arena_type = r.u8()?;
        let _unk = r.u8()?;
        let bg_type_id = r.u32()?;
        let _unk = r.u16()?;
        let action = r.u8()?;

        match action {
            PORT_ACTION_LEAVE_QUEUE => self.leave_battleground_queue(bg_type_id).await,
            PORT_ACTION_ENTER_BATTLE => self.enter_battleground(&ctx).await,
            other => Err(SessionError::Invalid(format!("unknown battlefield port action {}", other))),
        }
    }

    async fn leave_battleground_queue(&mut self, bg_type_id: u32) -> Result<(), SessionError> {
        let guid = self.character()?.guid();
        self.deps
            .matchmaking
            .remove_from_queue(self.settings().realm_id, guid, bg_type_id)
            .await?;
        self.send_to_client(packets::battlefield_status_none(0)).await
    }

    async fn enter_battleground(&mut self, ctx: &HandlerContext) -> Result<(), SessionError> {
        let realm_id = self.settings().realm_id;
        let (guid, race, current_map) = {
            let character = &self.character()?.record;
            (character.guid, character.race, character.map)
        };

        let slots = self.deps.matchmaking.queue_data_for_player(realm_id, guid).await?;
        let Some(slot) = slots.into_iter().next() else {
            return Ok(());
        };
        let assigned = slot
            .assigned
            .ok_or_else(|| SessionError::Invalid(format!("no battleground assigned to {}", guid)))?;

        self.deps
            .registry
            .add_address_mapping(&assigned.game_server_address, &assigned.control_address)
            .await;
        self.character_mut()?.ignore_next_new_world = Some(assigned.map_id);

        // Cross-realm servers host players from several realms.
        let is_cross_realm = assigned.battlegroup_id != 0;
        let player_guid = if is_cross_realm {
            crossrealm_player_guid(realm_id, guid)
        } else {
            guid
        };

        if self.backend_address() != Some(assigned.game_server_address.as_str()) {
            let target = WorldTarget::Address(assigned.game_server_address.clone());
            self.redirect(ctx, guid, player_guid, target, &assigned.game_server_address)
                .await?;
        }

        let control = self.deps.registry.client_for(&assigned.game_server_address).await?;
        let (alliance, horde) = match Team::for_race(race) {
            Team::Alliance => (vec![player_guid], Vec::new()),
            Team::Horde => (Vec::new(), vec![player_guid]),
        };
        control
            .add_players_to_battleground(AddPlayersRequest {
                bg_type_id: slot.bg_type_id,
                instance_id: assigned.instance_id,
                alliance,
                horde,
            })
            .await?;

        self.deps
            .matchmaking
            .player_joined_battleground(realm_id, guid, assigned.instance_id, is_cross_realm)
            .await?;
        self.character_mut()?.group_managed_by_game_server = true;
        info!("⚔️ Character {} joined battleground instance {}", guid, assigned.instance_id);

        self.forward_new_world_in_place(ctx, current_map).await
    }

    /// Drops what the world server sends until the player is moved into the
    /// battleground, then hands the SMSG_NEW_WORLD to the client.
    async fn forward_new_world_in_place(&mut self, ctx: &HandlerContext, current_map: u32) -> Result<(), SessionError> {
        let backend = self.backend.as_mut().ok_or(SessionError::NoBackend)?;
        let new_world = ctx
            .bounded(async {
                while let Some(frame) = backend.recv().await {
                    if frame.opcode == Opcode::SMSG_NEW_WORLD {
                        return Some(frame);
                    }
                }
                None
            })
            .await
            .flatten();

        let Some(frame) = new_world else {
            return Err(SessionError::Invalid("world server did not move the player into the battleground".into()));
        };
        let map_id = frame.reader().u32()?;
        if map_id != current_map {
            self.send_to_client(packets::transfer_pending(map_id)).await?;
        }
        self.send_to_client(frame).await
    }
}
