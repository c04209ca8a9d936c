//! The session dispatch loop.

use super::{GameSession, HandlerContext, Mutation, Recovery, SessionError};
use crate::endpoint::Endpoint;
use crate::protocol::{Frame, Source};
use gateway_events::{CharacterLoggedOutPayload, GatewayEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Time a handler gets past its deadline to report its own failure.
const DEADLINE_GRACE: Duration = Duration::from_millis(50);

enum Next {
    Mutation(Mutation),
    Client(Frame),
    Backend(Frame),
    BackendClosed,
    Event(GatewayEvent),
    EventsClosed,
    Stop,
}

async fn recv_backend(backend: &mut Option<Endpoint>) -> Option<Frame> {
    match backend {
        Some(endpoint) => endpoint.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_event(events: &mut Option<mpsc::Receiver<GatewayEvent>>) -> Option<GatewayEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl GameSession {
    /// Routes frames and events until the client disconnects, the session is
    /// cancelled or the client violates the protocol.
    pub async fn run(mut self) {
        debug!("▶️ Session of account {} started", self.account_id);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Next::Stop,
                Some(mutation) = self.mutations.recv() => Next::Mutation(mutation),
                frame = self.client.recv() => match frame {
                    Some(frame) => Next::Client(frame),
                    None => Next::Stop,
                },
                frame = recv_backend(&mut self.backend) => match frame {
                    Some(frame) => Next::Backend(frame),
                    None => Next::BackendClosed,
                },
                event = recv_event(&mut self.events) => match event {
                    Some(event) => Next::Event(event),
                    None => Next::EventsClosed,
                },
            };

            let result = match next {
                Next::Mutation(mutation) => {
                    mutation(&mut self);
                    Ok(())
                }
                Next::Client(frame) | Next::Backend(frame) => self.dispatch_frame(frame).await,
                Next::BackendClosed => {
                    self.on_backend_closed();
                    Ok(())
                }
                Next::Event(event) => self.dispatch_event(event).await,
                Next::EventsClosed => {
                    self.events = None;
                    Ok(())
                }
                Next::Stop => break,
            };

            if let Err(e) = result {
                warn!("🚫 Closing session of account {}: {}", self.account_id, e);
                break;
            }
        }

        self.terminate().await;
    }

    async fn dispatch_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        let deps = self.deps.clone();
        let Some(chain) = deps.tables.packet_handler(frame.source, frame.opcode) else {
            self.forward(frame).await;
            return Ok(());
        };

        let ctx = HandlerContext::new(self.settings().packet_timeout, &self.cancel);
        let opcode = frame.opcode;
        match ctx.within(DEADLINE_GRACE, chain.run(self, ctx.clone(), frame)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => self.report_handler_error(chain.name(), e).await?,
            None => warn!("⏰ Handler {} for {} timed out, account {}", chain.name(), opcode, self.account_id),
        }

        self.recover_if_stranded();
        Ok(())
    }

    async fn dispatch_event(&mut self, event: GatewayEvent) -> Result<(), SessionError> {
        let deps = self.deps.clone();
        let kind = event.kind();
        let Some(chain) = deps.tables.event_handler(kind) else {
            trace!("Dropping unhandled event {}", kind);
            return Ok(());
        };

        let ctx = HandlerContext::new(self.settings().packet_timeout, &self.cancel);
        match ctx.within(DEADLINE_GRACE, chain.run(self, ctx.clone(), event)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => self.report_handler_error(chain.name(), e).await?,
            None => warn!("⏰ Event handler {} timed out, account {}", chain.name(), self.account_id),
        }
        Ok(())
    }

    /// Sends a frame without a handler to the opposite endpoint.
    async fn forward(&mut self, frame: Frame) {
        let opcode = frame.opcode;
        let sent = match frame.source {
            Source::Client => match &self.backend {
                Some(backend) => backend.send(frame).await,
                None => {
                    trace!("Dropping {} from client, no world server", opcode);
                    return;
                }
            },
            Source::Backend => self.client.send(frame).await,
        };
        if let Err(e) = sent {
            debug!("Can't forward {}: {}", opcode, e);
        }
    }

    /// Logs a handler failure and tells the player about it when it is meant
    /// for them. Fatal errors are returned.
    async fn report_handler_error(&mut self, handler: &str, e: SessionError) -> Result<(), SessionError> {
        if e.is_fatal() {
            return Err(e);
        }

        error!("❌ Can't handle {}, account {}: {}", handler, self.account_id, e);
        if let Some(message) = e.user_message() {
            if self.character.is_some() {
                if let Err(send_error) = self.send_system_message(message).await {
                    debug!("Can't deliver error message: {}", send_error);
                }
            }
        }
        Ok(())
    }

    fn on_backend_closed(&mut self) {
        if let Some(backend) = self.backend.take() {
            warn!("💔 Lost world server {} of account {}", backend.address(), self.account_id);
        }
        self.recover_if_stranded();
    }

    /// Starts crash recovery when a character in the world has no world server,
    /// which happens when a connection drops or a redirect fails midway.
    fn recover_if_stranded(&mut self) {
        let stranded = self.backend.is_none()
            && self.character.as_ref().is_some_and(|c| c.recovery == Recovery::Idle);
        if stranded {
            self.start_recovery();
        }
    }

    /// Logs the character out: stops its events and publishes the logout.
    pub(crate) async fn logout(&mut self) {
        let Some(character) = self.character.take() else { return };
        self.events = None;
        self.teleporting_to_map = None;

        let record = character.record;
        self.deps.broadcaster.unregister_character(record.guid).await;
        let payload = CharacterLoggedOutPayload {
            realm_id: self.settings().realm_id,
            gateway_id: self.settings().gateway_id.clone(),
            guid: record.guid,
            name: record.name.clone(),
            guild_id: record.guild_id,
            account_id: self.account_id,
        };
        if let Err(e) = self.deps.producer.character_logged_out(payload).await {
            warn!("⚠️ Can't publish logout of {}: {}", record.name, e);
        }
        info!("👋 Character {} ({}) logged out", record.name, record.guid);
    }

    async fn terminate(&mut self) {
        self.cancel.cancel();
        if let Some(backend) = self.backend.take() {
            backend.close();
        }
        self.logout().await;
        self.client.close();
        debug!("⏹️ Session of account {} ended", self.account_id);
    }
}
