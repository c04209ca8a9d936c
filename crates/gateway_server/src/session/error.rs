use crate::endpoint::EndpointError;
use crate::protocol::packets::LoginFailureCode;
use crate::protocol::PacketError;
use crate::registry::RegistryError;
use crate::services::ServiceError;

/// Failure of a packet or event handler.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Shown to the player as a system message. Only the message reaches the
    /// client; the source is logged.
    #[error("{user_message}: {source}")]
    UserFacing {
        user_message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The client broke the protocol. The connection is closed.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Malformed packet: {0}")]
    Malformed(#[from] PacketError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    WorldConnect(#[from] WorldConnectError),

    #[error(transparent)]
    Redirect(#[from] RedirectError),

    /// The client disconnected while a handler was talking to it.
    #[error("Client disconnected")]
    ClientGone,

    #[error("No character is logged in")]
    NoCharacter,

    #[error("No world server connection")]
    NoBackend,

    #[error("{0}")]
    Invalid(String),
}

impl SessionError {
    pub fn user_facing(
        user_message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SessionError::UserFacing { user_message: user_message.into(), source: source.into() }
    }

    /// Text to show the player, if the error is meant for them.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            SessionError::UserFacing { user_message, .. } => Some(user_message),
            SessionError::Redirect(e) => Some(e.user_message()),
            _ => None,
        }
    }

    /// Whether the session must end.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Protocol(_) | SessionError::ClientGone)
    }
}

/// Failure to put a character on a world server.
#[derive(Debug, thiserror::Error)]
pub enum WorldConnectError {
    #[error("Character {0} not found")]
    CharacterNotFound(u64),

    #[error("No available world instances for map {0}")]
    NoInstance(u32),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl WorldConnectError {
    /// Code reported to the client when this failure ends a login.
    pub fn login_failure_code(&self) -> LoginFailureCode {
        match self {
            WorldConnectError::CharacterNotFound(_) => LoginFailureCode::CharNotFound,
            WorldConnectError::NoInstance(_) => LoginFailureCode::NoInstanceServers,
            _ => LoginFailureCode::LoginFailed,
        }
    }
}

/// Failure to move a player between world servers.
#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    #[error("World server {address} failed to prepare account {account_id} for redirect (status {status})")]
    Refused { address: String, account_id: u32, status: u8 },

    #[error("World server {address} did not confirm redirect of account {account_id} in time")]
    Unconfirmed { address: String, account_id: u32 },

    #[error("Redirect of account {account_id} from {address} was cancelled")]
    Cancelled { address: String, account_id: u32 },

    #[error("Can't redirect account {account_id} from {from} to {to}: {source}")]
    Connect {
        from: String,
        to: String,
        account_id: u32,
        #[source]
        source: WorldConnectError,
    },

    #[error("World server {address} closed before serving account {account_id}")]
    Abandoned { address: String, account_id: u32 },
}

impl RedirectError {
    pub fn user_message(&self) -> &'static str {
        match self {
            RedirectError::Refused { .. } | RedirectError::Unconfirmed { .. } | RedirectError::Cancelled { .. } => {
                "Failed to transfer you to another world server. Try again later."
            }
            RedirectError::Connect { .. } | RedirectError::Abandoned { .. } => {
                "Lost connection while transferring to another world server."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_protocol_errors_are_fatal() {
        assert!(SessionError::Protocol("repeated auth".into()).is_fatal());
        assert!(SessionError::ClientGone.is_fatal());
        assert!(!SessionError::NoBackend.is_fatal());
        assert!(!SessionError::user_facing("Try again later.", "service down").is_fatal());
    }

    #[test]
    fn test_user_message_hides_source() {
        let err = SessionError::user_facing("Group service unavailable. Try again later.", "connection refused");
        assert_eq!(err.user_message(), Some("Group service unavailable. Try again later."));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(SessionError::NoCharacter.user_message(), None);
    }

    #[test]
    fn test_redirect_errors_name_account_and_addresses() {
        let err = SessionError::from(RedirectError::Refused {
            address: "world-1:8085".into(),
            account_id: 3,
            status: 1,
        });
        assert!(err.user_message().is_some());
        let text = err.to_string();
        assert!(text.contains("world-1:8085") && text.contains('3'));
    }

    #[test]
    fn test_login_failure_codes() {
        assert_eq!(WorldConnectError::CharacterNotFound(1).login_failure_code(), LoginFailureCode::CharNotFound);
        assert_eq!(WorldConnectError::NoInstance(0).login_failure_code(), LoginFailureCode::NoInstanceServers);
    }
}
