//! Accept loop and per-connection handling.
//!
//! This module contains the gateway server structure and the logic that
//! takes an accepted TCP connection through the handshake into a session.

pub mod core;
pub mod handlers;

pub use self::core::GatewayServer;
