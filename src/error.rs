use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not authenticated (call open first)")]
    NotAuthenticated,

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Remote service error {status}: {}", .code.as_deref().unwrap_or("unknown"))]
    RemoteService {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Invalid response from service: {0}")]
    InvalidResponse(String),
}

impl QueryError {
    /// Whether the session that produced this error can no longer be used.
    #[must_use]
    pub const fn invalidates_session(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::Authentication(_))
    }

    /// Upstream HTTP status, when the service answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteService { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;
