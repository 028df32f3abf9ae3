use thiserror::Error;

/// Client-side API error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    /// Login rejected by the server.
    #[error("auth: {0}")]
    Auth(String),

    /// Credentials expired and could not be renewed. The session has been
    /// cleared; the caller should send the user back to a login surface.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("decode: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the error means the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_) | ApiError::NotAuthenticated)
    }
}

/// Why a token refresh did not produce a new token.
///
/// Cloneable so every request waiting on the same refresh observes the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("refresh rejected with HTTP {0}")]
    Rejected(u16),

    #[error("refresh transport error: {0}")]
    Network(String),

    #[error("malformed refresh response: {0}")]
    Malformed(String),

    /// The session was cleared before this request could be retried.
    #[error("session was logged out")]
    LoggedOut,
}

impl From<RefreshFailure> for ApiError {
    fn from(e: RefreshFailure) -> Self {
        ApiError::SessionExpired(e.to_string())
    }
}
