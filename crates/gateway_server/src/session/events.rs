use super::{GameSession, HandlerContext, SessionError};
use crate::protocol::packets;
use gateway_events::GatewayEvent;

fn unexpected(event: &GatewayEvent) -> SessionError {
    SessionError::Invalid(format!("unexpected event {}", event.kind()))
}

impl GameSession {
    pub(crate) async fn handle_bg_joined_queue(&mut self, _ctx: HandlerContext, event: GatewayEvent) -> Result<(), SessionError> {
        let GatewayEvent::BattlegroundJoinedQueue(payload) = &event else {
            return Err(unexpected(&event));
        };
        let guid = self.character()?.guid();
        self.send_to_client(packets::battlefield_status_in_queue(guid, &payload.queue, payload.average_wait_ms))
            .await?;

        let invites = &mut self.character_mut()?.invites;
        invites.waiting_join_to_queue = false;
        if let Some(invite) = invites.pending_invite.take() {
            self.send_to_client(invite).await?;
        }
        Ok(())
    }

    /// Invites can overtake the queue confirmation; they are held back until
    /// the confirmation was delivered.
    pub(crate) async fn handle_bg_invited(&mut self, _ctx: HandlerContext, event: GatewayEvent) -> Result<(), SessionError> {
        let GatewayEvent::BattlegroundInvited(payload) = &event else {
            return Err(unexpected(&event));
        };
        let character = self.character_mut()?;
        let frame = packets::battlefield_status_invited(
            character.guid(),
            &payload.queue,
            payload.map_id,
            payload.time_to_accept_ms,
        );
        if character.invites.waiting_join_to_queue {
            character.invites.pending_invite = Some(frame);
            return Ok(());
        }
        self.send_to_client(frame).await
    }

    pub(crate) async fn handle_bg_invite_expired(
        &mut self,
        _ctx: HandlerContext,
        event: GatewayEvent,
    ) -> Result<(), SessionError> {
        let GatewayEvent::BattlegroundInviteExpired(_) = &event else {
            return Err(unexpected(&event));
        };
        self.send_to_client(packets::battlefield_status_none(0)).await
    }

    pub(crate) async fn handle_bg_status_changed(
        &mut self,
        _ctx: HandlerContext,
        event: GatewayEvent,
    ) -> Result<(), SessionError> {
        let GatewayEvent::BattlegroundStatusChanged(payload) = &event else {
            return Err(unexpected(&event));
        };
        self.send_to_client(packets::battlefield_status(0, payload.type_id, payload.status)).await
    }
}
