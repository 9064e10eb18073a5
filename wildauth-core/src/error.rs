use thiserror::Error;

/// Errors surfaced by any step of an authentication attempt.
///
/// Nothing is retried. A failed step fails the whole attempt and the caller decides
/// whether to restart from the authorization redirect.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid configuration, detected before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The provider answered with a non-success status.
    #[error("External service error ({status}): {body}")]
    ExternalService {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// The provider's response could not be parsed into the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// The request never produced a response (connection failure, timeout).
    #[error("Network error: {0}")]
    Network(String),
    /// The state returned on the callback does not match the one issued.
    #[error("CSRF state mismatch")]
    CsrfMismatch,
    /// Error raised by host code such as a user mapper.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// HTTP status of an [`AuthError::ExternalService`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ExternalService { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::MalformedResponse(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::Configuration(format!("invalid URL: {err}"))
    }
}
