//! Authentication error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;
use url::Url;

/// Errors raised while negotiating with the backend or resolving a session's client.
///
/// None of these are retried inside the proxy; they propagate to the HTTP
/// boundary unchanged.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The network call to the backend could not complete.
    #[error("backend unreachable at {url}: {source}")]
    UnreachableBackend {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend's `WWW-Authenticate` header is missing or does not parse.
    #[error("malformed authentication challenge: {0}")]
    MalformedChallenge(String),

    /// The backend rejected the caller's identity.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A token exists for the session but it carries no authenticated client.
    #[error("session is not authenticated")]
    SessionNotAuthenticated,

    /// No pending token and no bound client for the session.
    #[error("no security context for session")]
    NoSecurityContext,

    /// Any other non-success backend status seen during validation.
    #[error("backend responded with {status}")]
    BackendError { status: StatusCode },

    /// The target URI could not be composed from the backend config.
    #[error("unable to build backend URI: {0}")]
    InvalidUri(String),
}

impl AuthError {
    pub(crate) fn unreachable(url: &Url, source: reqwest::Error) -> Self {
        AuthError::UnreachableBackend {
            url: url.to_string(),
            source,
        }
    }

    /// True for the "caller never logged in" conditions.
    pub fn is_not_logged_in(&self) -> bool {
        matches!(
            self,
            AuthError::NoSecurityContext | AuthError::SessionNotAuthenticated
        )
    }
}

impl From<url::ParseError> for AuthError {
    fn from(e: url::ParseError) -> Self {
        AuthError::InvalidUri(e.to_string())
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
