use crate::error::AuthError;
use base64::Engine;

/// Build an `Authorization` header value for HTTP Basic client authentication.
///
/// The credentials are encoded with the standard base64 alphabet, padded, on a single line.
pub fn basic_authorization(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// Pass a successful response through, or turn any other status into
/// [`AuthError::ExternalService`] carrying the status and body.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::ExternalService {
        status: status.as_u16(),
        body,
    })
}
