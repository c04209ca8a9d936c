//! Whispers, which cross world servers and so go through the chat service.
//! Every other chat message is the world server's business.

use super::{GameSession, HandlerContext, SessionError};
use crate::protocol::{packets, Frame};
use crate::services::WhisperRequest;
use gateway_events::GatewayEvent;
use tracing::debug;

impl GameSession {
    pub(crate) async fn handle_message_chat(&mut self, _ctx: HandlerContext, frame: Frame) -> Result<(), SessionError> {
        let mut r = frame.reader();
        let kind = r.u32()?;
        let language = r.u32()?;
        if kind != u32::from(packets::CHAT_MSG_WHISPER) {
            return self.send_to_backend(frame).await;
        }
        let receiver_name = r.cstring()?;
        let message = r.cstring()?;

        let sender = &self.character()?.record;
        let request = WhisperRequest {
            realm_id: self.settings().realm_id,
            sender_guid: sender.guid,
            sender_name: sender.name.clone(),
            sender_race: sender.race,
            language,
            receiver_name: receiver_name.clone(),
            message: message.clone(),
        };

        match self.deps.chat.send_whisper(request).await? {
            Some(receiver) => {
                self.send_to_client(packets::whisper_inform(receiver, language, &message))
                    .await
            }
            None => {
                debug!("Whisper receiver {} is not online", receiver_name);
                self.send_to_client(packets::chat_player_not_found(&receiver_name))
                    .await
            }
        }
    }

    pub(crate) async fn handle_incoming_whisper(
        &mut self,
        _ctx: HandlerContext,
        event: GatewayEvent,
    ) -> Result<(), SessionError> {
        let GatewayEvent::IncomingWhisper(payload) = &event else {
            return Err(SessionError::Invalid(format!("unexpected event {}", event.kind())));
        };
        self.send_to_client(packets::whisper(payload.sender_guid, payload.language, &payload.message))
            .await
    }
}
