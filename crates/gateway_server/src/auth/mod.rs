//! Client authentication: the challenge/response handshake that precedes every
//! session, and the addon block carried by the auth request.

pub mod addons;
pub mod handshake;

pub use addons::{addon_info_packet, parse_addon_block, AddonError, AddonInfo};
pub use handshake::{perform_handshake, AuthSessionRequest, Authenticated, HandshakeError};
