//! Challenge/response authentication of a game client.
//!
//! The gateway sends a random seed. The client proves knowledge of the session
//! key negotiated with the authentication server by sending
//! `SHA1(account | 0u32 | local challenge | seed | session key)`. On success the
//! header cipher is switched on before the auth response goes out, so the
//! response is the first encrypted frame.

use super::addons::{addon_info_packet, parse_addon_block, AddonError, AddonInfo};
use crate::crypto::{CipherError, SessionCipher};
use crate::protocol::{packets, CodecError, Frame, FrameCodec, Opcode, PacketError};
use crate::services::{Account, AccountRepository, ServiceError};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Connection closed before authentication")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Malformed auth session request: {0}")]
    Malformed(#[from] PacketError),

    #[error("Account service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Unknown account {0}")]
    UnknownAccount(String),

    #[error("Authentication failed, account: {account} ({id})")]
    DigestMismatch { account: String, id: u32 },

    #[error("Can't create cipher: {0}")]
    Cipher(#[from] CipherError),

    #[error("Can't handle addons: {0}")]
    Addons(#[from] AddonError),
}

/// Parsed CMSG_AUTH_SESSION.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSessionRequest {
    pub build: u32,
    pub login_server_id: u32,
    pub account: String,
    pub login_server_type: u32,
    pub local_challenge: [u8; 4],
    pub region_id: u32,
    pub battlegroup_id: u32,
    pub realm_id: u32,
    pub dos_response: u64,
    pub digest: [u8; 20],
    pub addon_block: Bytes,
}

impl AuthSessionRequest {
    pub fn parse(frame: &Frame) -> Result<Self, PacketError> {
        let mut r = frame.reader();
        Ok(Self {
            build: r.u32()?,
            login_server_id: r.u32()?,
            account: r.cstring()?,
            login_server_type: r.u32()?,
            local_challenge: r.array()?,
            region_id: r.u32()?,
            battlegroup_id: r.u32()?,
            realm_id: r.u32()?,
            dos_response: r.u64()?,
            digest: r.array()?,
            addon_block: Bytes::copy_from_slice(r.rest()),
        })
    }
}

/// Digest a client holding `session_key` sends for `seed`.
pub fn auth_digest(account: &str, local_challenge: &[u8; 4], seed: &[u8; 4], session_key: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(account.as_bytes());
    hasher.update([0u8; 4]);
    hasher.update(local_challenge);
    hasher.update(seed);
    hasher.update(session_key);

    let mut digest = [0u8; 20];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub account: Account,
    /// The original auth request, replayed to every world server the session
    /// connects to.
    pub auth_frame: Frame,
    pub addons: Vec<AddonInfo>,
}

/// Runs the handshake on a freshly accepted client connection.
///
/// Frames other than the auth request are dropped until it arrives. On any
/// failure the caller closes the connection; no response frame has been sent.
/// On success the codec has the cipher installed.
pub async fn perform_handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    accounts: &dyn AccountRepository,
) -> Result<Authenticated, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let seed: [u8; 4] = rand::random();
    let random: [u8; 32] = rand::random();
    framed.send(packets::auth_challenge(seed, &random)).await?;

    let auth_frame = loop {
        match framed.next().await {
            Some(Ok(frame)) if frame.opcode == Opcode::CMSG_AUTH_SESSION => break frame,
            Some(Ok(frame)) => debug!("Dropping {} received before authentication", frame.opcode),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(HandshakeError::Closed),
        }
    };

    let request = AuthSessionRequest::parse(&auth_frame)?;
    let account = accounts
        .account_by_username(&request.account)
        .await?
        .ok_or_else(|| HandshakeError::UnknownAccount(request.account.clone()))?;

    let expected = auth_digest(&request.account, &request.local_challenge, &seed, &account.session_key);
    if expected != request.digest {
        warn!("🚫 Wrong auth digest for account {} ({})", account.username, account.id);
        return Err(HandshakeError::DigestMismatch { account: request.account, id: account.id });
    }

    framed.codec_mut().set_cipher(SessionCipher::server(&account.session_key)?);
    framed.send(packets::auth_response_ok()).await?;

    let addons = parse_addon_block(&request.addon_block)?;
    if let Some(addons) = &addons {
        framed.send(addon_info_packet(addons)).await?;
    }
    framed.send(packets::tutorial_flags()).await?;

    info!("🔐 Account {} ({}) authenticated, build {}", account.username, account.id, request.build);
    Ok(Authenticated { account, auth_frame, addons: addons.unwrap_or_default() })
}
