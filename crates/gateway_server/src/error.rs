//! Error types for the gateway server.
//!
//! Errors of the individual layers (codec, handshake, endpoints, registry,
//! services, sessions) live next to the code that produces them. This module
//! holds the top-level error the server returns to the process.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as a failed service registration
    #[error("Internal error: {0}")]
    Internal(String),
}
