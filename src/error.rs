/// Errors surfaced by the session manager.
///
/// Device and transport errors force the session back to `Disconnected`.
/// Protocol and side-effect errors stay confined to the message or call that
/// caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Side effect failed: {0}")]
    SideEffect(String),
    #[error("A session is already active")]
    AlreadyActive,
}

impl SessionError {
    pub(crate) fn device(err: impl std::fmt::Display) -> Self {
        SessionError::Device(err.to_string())
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        SessionError::Transport(err.to_string())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
