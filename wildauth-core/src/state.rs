use crate::error::AuthError;
use chrono::{DateTime, Duration, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Raw profile record returned by a provider, keyed by the provider's field names.
pub type RawProfile = serde_json::Map<String, serde_json::Value>;

/// An ordered set of request parameters.
///
/// Used both for the authorization query string and for the token request form body.
/// Keys are kept sorted so serialized requests are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Params::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get the value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge `overrides` into this set. Keys present in both take the value from `overrides`.
    pub fn merge(mut self, overrides: Params) -> Self {
        self.0.extend(overrides.0);
        self
    }

    /// Iterate over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A token endpoint request before it is sent: form body plus extra headers.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// Form-encoded body parameters.
    pub params: Params,
    /// Headers added to the POST request.
    pub headers: HeaderMap,
}

impl TokenRequest {
    /// Create a token request with the given body and no extra headers.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            headers: HeaderMap::new(),
        }
    }
}

/// Client credentials and endpoints a strategy hands to the flow driver.
///
/// `authorize_url` and `token_url` are resolved against `site`, so each may be either a
/// path on the site or an absolute URL on another host.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientDescriptor {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Base URL the relative endpoints are resolved against.
    pub site: String,
    /// Authorization endpoint, relative to `site` or absolute.
    pub authorize_url: String,
    /// Token endpoint, relative to `site` or absolute.
    pub token_url: String,
}

impl ClientDescriptor {
    /// Fully resolved authorization endpoint.
    pub fn authorize_endpoint(&self) -> Result<Url, AuthError> {
        self.resolve(&self.authorize_url)
    }

    /// Fully resolved token endpoint.
    pub fn token_endpoint(&self) -> Result<Url, AuthError> {
        self.resolve(&self.token_url)
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, AuthError> {
        Ok(Url::parse(&self.site)?.join(endpoint)?)
    }
}

impl fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("site", &self.site)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Access token payload returned by a token endpoint.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    /// The bearer credential.
    pub access_token: String,
    /// Token type, usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds, counted from issuance.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope, if echoed by the provider.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Absolute expiry for a token issued at `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        issued_at.checked_add_signed(Duration::seconds(secs))
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Normalized identity produced at the end of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider that authenticated the user, e.g. `wild_apricot`.
    pub provider_id: String,
    /// Provider-scoped unique user id.
    pub uid: String,
    /// Common profile fields.
    pub info: IdentityInfo,
    /// Provider-specific data.
    pub extra: IdentityExtra,
}

/// Common profile fields of an [`Identity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Email address.
    pub email: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Display name.
    pub name: String,
}

/// Provider-specific data of an [`Identity`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityExtra {
    /// The raw profile, exactly as returned by the provider.
    pub raw_info: RawProfile,
}

/// Host-supplied pieces of the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackContext {
    /// Scheme and host of the application, e.g. `https://app.example.com`.
    pub full_host: String,
    /// Mount point of the application, usually empty.
    pub script_name: String,
    /// Path of the callback route.
    pub callback_path: String,
}

impl CallbackContext {
    /// Create a callback context.
    pub fn new(
        full_host: impl Into<String>,
        script_name: impl Into<String>,
        callback_path: impl Into<String>,
    ) -> Self {
        Self {
            full_host: full_host.into(),
            script_name: script_name.into(),
            callback_path: callback_path.into(),
        }
    }

    /// `full_host + script_name + callback_path`, without any normalization.
    pub fn callback_url(&self) -> String {
        format!("{}{}{}", self.full_host, self.script_name, self.callback_path)
    }
}
