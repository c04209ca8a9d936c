//! Connection handling logic for game clients.
//!
//! This module takes one accepted connection through authentication and runs
//! its session to completion.

use crate::{
    auth::perform_handshake,
    endpoint::{Endpoint, EndpointKind},
    error::ServerError,
    protocol::FrameCodec,
    services::AccountRepository,
    session::{GameSession, SessionDeps},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Handles a single client connection from accept to disconnect.
///
/// # Connection Flow
///
/// 1. Send the auth challenge and verify the client's digest
/// 2. Switch the connection to an encrypted [`Endpoint`]
/// 3. Run a [`GameSession`] until the client leaves or shutdown is initiated
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `accounts` - Account lookup for the handshake
/// * `deps` - Dependencies shared by all sessions
/// * `shutdown` - Server shutdown token; the session runs under a child of it
///
/// # Returns
///
/// `Ok(())` once the session ended, or a `ServerError` if the client never
/// authenticated. A failed handshake closes the connection without a
/// response.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    accounts: Arc<dyn AccountRepository>,
    deps: Arc<SessionDeps>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    stream
        .set_nodelay(true)
        .map_err(|e| ServerError::Network(format!("Can't configure {addr}: {e}")))?;
    debug!("🔗 New connection from {}", addr);

    let mut framed = Framed::new(stream, FrameCodec::client_facing());
    let authenticated = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        result = perform_handshake(&mut framed, accounts.as_ref()) => {
            result.map_err(|e| ServerError::Network(format!("Handshake with {addr} failed: {e}")))?
        }
    };

    let account = authenticated.account;
    debug!("Account {} reported {} addon(s)", account.username, authenticated.addons.len());

    let client = Endpoint::from_framed(addr.to_string(), EndpointKind::Client, framed);
    let span = info_span!("session", account = %account.username, character = tracing::field::Empty);
    let session = GameSession::new(
        account.id,
        account.username.clone(),
        authenticated.auth_frame,
        client,
        deps,
        shutdown.child_token(),
    );
    session.run().instrument(span).await;

    info!("👋 Connection {} of account {} closed", addr, account.username);
    Ok(())
}
