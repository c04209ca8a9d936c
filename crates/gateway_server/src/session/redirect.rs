//! Moving a player between world servers, and crash recovery.
//!
//! A redirect asks the current world server to save the player, waits for its
//! confirmation, then logs the character in on the target server. The client
//! keeps its connection to the gateway throughout and only sees the frames the
//! new server sends.
//!
//! Recovery runs when a character in the world is left without a world server.
//! It retries the login on a background task and hands the new connection to
//! the session through its mutation mailbox.

use super::{
    connect_to_world, connect_to_world_as, GameSession, HandlerContext, MutationSender, Recovery, RedirectError,
    SessionDeps, SessionError, WorldTarget,
};
use crate::endpoint::{Endpoint, FrameSender};
use crate::protocol::packets::{self, LoginFailureCode};
use crate::protocol::{Frame, Opcode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum Confirmation {
    Ready,
    Refused(u8),
    Closed,
    TimedOut,
    Cancelled,
    ClientGone,
}

impl GameSession {
    /// Moves the logged-in character `guid` to the world server at
    /// `target_address`, where it logs in as `login_guid`.
    ///
    /// The old server gets `redirect_confirm_timeout` to confirm, however
    /// much of the packet deadline is left. Once it did, connecting to the
    /// target and waiting for its first frame get a fresh packet deadline.
    ///
    /// Frames the old server sends while saving the player are forwarded to
    /// the client right away, and client frames still go to the old server.
    /// Only the first frame of the new server is held until the new
    /// connection is attached, so the client never sees a frame from a
    /// server the gateway is not routing to.
    ///
    /// If the old server refuses or does not confirm, the player stays where
    /// they are. Once the old connection is closed, any failure leaves the
    /// session without a world server, which starts recovery.
    pub(crate) async fn redirect(
        &mut self,
        ctx: &HandlerContext,
        guid: u64,
        login_guid: u64,
        target: WorldTarget,
        target_address: &str,
    ) -> Result<(), SessionError> {
        let account_id = self.account_id;
        let mut old = self.backend.take().ok_or(SessionError::NoBackend)?;
        let from = old.address().to_string();
        info!("🔀 Redirecting account {} from {} to {}", account_id, from, target_address);

        let wait = self.settings().redirect_confirm_timeout;
        ctx.extend(wait);
        let confirmation = match old.send(packets::prepare_for_redirect()).await {
            Ok(()) => self.await_redirect_confirmation(ctx, &mut old, wait).await,
            Err(_) => Confirmation::Closed,
        };
        match confirmation {
            Confirmation::Ready => {}
            Confirmation::Closed => {
                warn!("⚠️ World server {} closed while preparing account {} for redirect", from, account_id);
            }
            Confirmation::Refused(status) => {
                self.backend = Some(old);
                return Err(RedirectError::Refused { address: from, account_id, status }.into());
            }
            Confirmation::TimedOut => {
                self.backend = Some(old);
                return Err(RedirectError::Unconfirmed { address: from, account_id }.into());
            }
            Confirmation::Cancelled => {
                self.backend = Some(old);
                return Err(RedirectError::Cancelled { address: from, account_id }.into());
            }
            Confirmation::ClientGone => {
                self.backend = Some(old);
                return Err(SessionError::ClientGone);
            }
        }
        old.close();
        drop(old);

        ctx.extend(self.settings().packet_timeout);
        let world = ctx
            .bounded(connect_to_world_as(&self.deps, &self.auth_frame, guid, login_guid, target))
            .await
            .ok_or_else(|| RedirectError::Abandoned { address: target_address.to_string(), account_id })?
            .map_err(|source| RedirectError::Connect {
                from: from.clone(),
                to: target_address.to_string(),
                account_id,
                source,
            })?;
        let mut endpoint = world.endpoint;

        let first = ctx.bounded(endpoint.recv()).await;
        let Some(Some(first)) = first else {
            endpoint.close();
            return Err(RedirectError::Abandoned { address: target_address.to_string(), account_id }.into());
        };

        self.backend = Some(endpoint);
        self.send_to_client(first).await?;

        if self.settings().show_redirects {
            self.send_system_message(&format!(
                "You have been redirected from {} to {} gameserver.",
                from, target_address
            ))
            .await?;
        }
        info!("✅ Account {} redirected to {}", account_id, target_address);
        Ok(())
    }

    /// Waits for SMSG_READY_FOR_REDIRECT, relaying traffic between the client
    /// and the old world server until it arrives.
    async fn await_redirect_confirmation(
        &mut self,
        ctx: &HandlerContext,
        old: &mut Endpoint,
        wait: Duration,
    ) -> Confirmation {
        let limit = tokio::time::sleep(wait);
        tokio::pin!(limit);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Confirmation::Cancelled,
                _ = &mut limit => return Confirmation::TimedOut,
                frame = old.recv() => {
                    let Some(frame) = frame else { return Confirmation::Closed };
                    if frame.opcode == Opcode::SMSG_READY_FOR_REDIRECT {
                        return match frame.reader().u8() {
                            Ok(0) => Confirmation::Ready,
                            Ok(status) => Confirmation::Refused(status),
                            Err(_) => Confirmation::Refused(u8::MAX),
                        };
                    }
                    if let Err(e) = self.client.send(frame).await {
                        warn!("Can't deliver frame during redirect: {}", e);
                    }
                }
                frame = self.client.recv() => {
                    let Some(frame) = frame else { return Confirmation::ClientGone };
                    if let Err(e) = old.send(frame).await {
                        debug!("Can't forward client frame during redirect: {}", e);
                    }
                }
            }
        }
    }

    /// Starts reconnecting the character to a world server in the background.
    pub(crate) fn start_recovery(&mut self) {
        let Some(character) = self.character.as_mut() else { return };
        character.recovery = Recovery::Running;
        let guid = character.guid();
        warn!("🚑 Starting recovery of character {} ({})", character.record.name, guid);

        let recovery = RecoveryTask {
            deps: self.deps.clone(),
            auth_frame: self.auth_frame.clone(),
            guid,
            client: self.client.sender(),
            mutations: self.mutation_sender(),
        };
        let cancel = self.cancel.child_token();
        tokio::spawn(recovery.run(cancel));
    }
}

struct RecoveryTask {
    deps: Arc<SessionDeps>,
    auth_frame: Frame,
    guid: u64,
    client: FrameSender,
    mutations: MutationSender,
}

impl RecoveryTask {
    async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.recover() => {}
        }
    }

    async fn recover(&self) {
        let settings = &self.deps.settings;
        self.notify("Lost connection with world server...").await;
        tokio::time::sleep(settings.recovery_notify_delay).await;
        self.notify("Trying to recover...").await;
        tokio::time::sleep(settings.recovery_resume_delay).await;

        for attempt in 1..=settings.recovery_attempts {
            if attempt > 1 {
                tokio::time::sleep(settings.recovery_retry_delay).await;
            }
            match connect_to_world(&self.deps, &self.auth_frame, self.guid, WorldTarget::CharacterMap).await {
                Ok(world) => {
                    let c = &world.character;
                    self.send(packets::new_world(c.map, c.position_x, c.position_y, c.position_z, 0.0)).await;
                    self.notify("Connection recovered! Sorry for inconvenience.").await;
                    info!("✅ Recovered character {} on {}", self.guid, world.endpoint.address());
                    self.attach(world.endpoint).await;
                    return;
                }
                Err(e) => error!(
                    "❌ Recovery attempt {}/{} of character {} failed: {}",
                    attempt, settings.recovery_attempts, self.guid, e
                ),
            }
        }

        self.notify("Failed :( Returning to the characters screen.").await;
        tokio::time::sleep(settings.recovery_notify_delay).await;
        self.send(packets::character_login_failed(LoginFailureCode::WorldServerIsDown)).await;
        self.mutations
            .post(|session| {
                if let Some(character) = session.character.as_mut() {
                    character.recovery = Recovery::Exhausted;
                }
            })
            .await;
    }

    /// Hands `endpoint` to the session, unless the character left the world
    /// in the meantime.
    async fn attach(&self, endpoint: Endpoint) {
        let guid = self.guid;
        let posted = self
            .mutations
            .post(move |session| {
                let Some(character) = session.character.as_mut().filter(|c| c.guid() == guid) else {
                    endpoint.close();
                    return;
                };
                character.recovery = Recovery::Idle;
                if session.backend.is_none() {
                    session.backend = Some(endpoint);
                } else {
                    endpoint.close();
                }
            })
            .await;
        if !posted {
            warn!("Session of character {} ended during recovery", guid);
        }
    }

    async fn send(&self, frame: Frame) {
        if let Err(e) = self.client.send(frame).await {
            warn!("Can't deliver recovery frame: {}", e);
        }
    }

    async fn notify(&self, text: &str) {
        self.send(packets::system_message(text)).await;
    }
}
