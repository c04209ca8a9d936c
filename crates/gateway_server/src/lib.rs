//! # Gateway Server
//!
//! A protocol-aware gateway between game clients and a pool of world servers.
//! Clients keep one TCP connection to the gateway while the gateway moves
//! their characters between world servers, recovers from world server
//! crashes and answers part of the protocol itself.
//!
//! ## Architecture Overview
//!
//! * **Protocol** ([`protocol`]) - Frame codec with 2-byte client and 4-byte
//!   backend opcodes, payload readers and writers, and the packets the
//!   gateway builds itself
//! * **Cipher** ([`crypto`]) - RC4 header encryption keyed from the session key
//! * **Handshake** ([`auth`]) - Challenge/response authentication and the
//!   addon block
//! * **Endpoints** ([`endpoint`]) - One read and one write task per
//!   connection, bounded queues in both directions
//! * **Sessions** ([`session`]) - The per-player dispatch loop, handler
//!   tables, redirects and crash recovery
//! * **Registry** ([`registry`]) - Control-plane clients of world servers,
//!   cached by game address
//! * **Services** ([`services`]) - Contracts of the remote services and their
//!   JSON-lines client
//!
//! ## Message Flow
//!
//! 1. The client connects and passes the handshake
//! 2. Its session forwards frames between the client and the world server
//!    hosting its character
//! 3. Frames with a registered handler are handled by the gateway instead, under
//!    a per-packet deadline
//! 4. Events addressed to the character arrive through the
//!    [`EventBroadcaster`](gateway_events::EventBroadcaster) and are turned
//!    into client packets
//!
//! ## Error Handling
//!
//! Each layer has its own error enum. [`ServerError`] is what the server
//! returns to the process; [`session::SessionError`] separates protocol
//! violations, which close the connection, from failures that are only logged
//! or shown to the player.

pub use config::{GatewayConfig, SessionSettings};
pub use error::ServerError;
pub use server::GatewayServer;

pub mod auth;
pub mod config;
pub mod crypto;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod services;
pub mod session;

#[cfg(test)]
mod tests;
