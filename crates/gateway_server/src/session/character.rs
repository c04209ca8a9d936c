//! Character screen handlers: listing, creating, deleting and entering the world.

use super::{connect_to_world, GameSession, HandlerContext, SessionCharacter, SessionError, WorldTarget};
use crate::protocol::{packets, Frame, Opcode, PacketWriter, Source};
use crate::services::Character;
use gateway_events::CharacterLoggedInPayload;
use tracing::{info, warn};

/// Character flags every listed character carries.
const CHARACTER_FLAGS: u32 = 0x0200_0000;

fn char_enum(characters: &[Character]) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_CHAR_ENUM, 1 + characters.len() * 256);
    w.u8(characters.len() as u8);
    for c in characters {
        w.u64(c.guid)
            .cstring(&c.name)
            .u8(c.race)
            .u8(c.class)
            .u8(c.gender)
            .u8(c.skin)
            .u8(c.face)
            .u8(c.hair_style)
            .u8(c.hair_color)
            .u8(c.facial_style)
            .u8(c.level)
            .u32(c.zone)
            .u32(c.map)
            .f32(c.position_x)
            .f32(c.position_y)
            .f32(c.position_z)
            .u32(c.guild_id)
            .u32(CHARACTER_FLAGS)
            .u32(0) // customization flags
            .u8(0) // first login
            .u32(c.pet_model_id)
            .u32(c.pet_level)
            .u32(0); // pet family
        for item in &c.equipment {
            w.u32(item.display_info_id).u8(item.inventory_type).u32(item.enchantment_id);
        }
    }
    w.finish(Source::Backend)
}

impl GameSession {
    /// Returns the player to the character screen and lists their characters.
    pub(crate) async fn handle_char_enum(&mut self, _ctx: HandlerContext, _frame: Frame) -> Result<(), SessionError> {
        if let Some(backend) = self.backend.take() {
            backend.close();
        }
        self.logout().await;

        let characters = self
            .deps
            .characters
            .characters_for_account(self.settings().realm_id, self.account_id)
            .await?;
        self.send_to_client(char_enum(&characters)).await
    }

    pub(crate) async fn handle_char_create(&mut self, ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let result = self.relay_through_world_server(&ctx, frame, Opcode::SMSG_CHAR_CREATE).await;
        if result.is_err() {
            self.send_to_client(packets::char_create_result(packets::CHAR_CREATE_FAILED)).await?;
        }
        result
    }

    pub(crate) async fn handle_char_delete(&mut self, ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let result = self.relay_through_world_server(&ctx, frame, Opcode::SMSG_CHAR_DELETE).await;
        if result.is_err() {
            self.send_to_client(packets::char_delete_result(packets::CHAR_DELETE_FAILED)).await?;
        }
        result
    }

    /// Characters are created and deleted by a world server. Opens a temporary
    /// connection to any server, sends it `request` and relays everything it
    /// answers to the client until the `reply` opcode arrives.
    async fn relay_through_world_server(
        &mut self,
        ctx: &HandlerContext,
        request: Frame,
        reply: Opcode,
    ) -> Result<(), SessionError> {
        let server = self
            .deps
            .servers
            .random_server(self.settings().realm_id)
            .await?
            .ok_or_else(|| SessionError::Invalid(format!("no world server available to handle {}", request.opcode)))?;

        let mut world = self.deps.connector.connect(&server.address).await?;
        world.send(self.auth_frame.clone()).await?;
        tokio::time::sleep(self.settings().login_delay).await;
        world.send(request).await?;

        let relayed = ctx
            .bounded(async {
                while let Some(frame) = world.recv().await {
                    let done = frame.opcode == reply;
                    self.client.send(frame).await?;
                    if done {
                        return Ok(true);
                    }
                }
                Ok::<_, SessionError>(false)
            })
            .await;
        world.close();

        match relayed {
            Some(Ok(true)) => Ok(()),
            Some(Ok(false)) => Err(SessionError::Invalid(format!(
                "world server {} closed before answering with {}",
                server.address, reply
            ))),
            Some(Err(e)) => Err(e),
            None => Err(SessionError::Invalid(format!(
                "world server {} did not answer with {} in time",
                server.address, reply
            ))),
        }
    }

    /// Enters the world with the requested character.
    pub(crate) async fn handle_player_login(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let guid = frame.reader().u64()?;

        if let Some(backend) = self.backend.take() {
            backend.close();
        }
        self.logout().await;

        let world = match connect_to_world(&self.deps, &self.auth_frame, guid, WorldTarget::CharacterMap).await {
            Ok(world) => world,
            Err(e) => {
                self.send_to_client(packets::character_login_failed(e.login_failure_code())).await?;
                return Err(e.into());
            }
        };

        let record = world.character;
        self.backend = Some(world.endpoint);
        self.events = Some(self.deps.broadcaster.register_character(record.guid).await);
        tracing::Span::current().record("character", record.name.as_str());

        let payload = CharacterLoggedInPayload {
            realm_id: self.settings().realm_id,
            gateway_id: self.settings().gateway_id.clone(),
            guid: record.guid,
            name: record.name.clone(),
            race: record.race,
            class: record.class,
            gender: record.gender,
            level: record.level,
            zone: record.zone,
            map: record.map,
            position: [record.position_x, record.position_y, record.position_z],
            guild_id: record.guild_id,
            account_id: self.account_id,
        };
        if let Err(e) = self.deps.producer.character_logged_in(payload).await {
            warn!("⚠️ Can't publish login of {}: {}", record.name, e);
        }

        info!(
            "🎮 Character {} ({}) of account {} entered the world on {}",
            record.name,
            record.guid,
            self.account_id,
            self.backend_address().unwrap_or_default()
        );
        self.character = Some(SessionCharacter::new(record));
        Ok(())
    }
}
