//! # Wild Apricot provider
//!
//! An [`OAuthStrategy`] for Wild Apricot, the membership-management service.
//!
//! Wild Apricot differs from a plain OAuth2 provider in a few ways, all handled here:
//!
//! - the login page lives on the organization's own site (`{site}/sys/login/OAuthLogin`),
//!   while tokens are issued by a fixed host (`https://oauth.wildapricot.org/auth/token`);
//! - the authorization request must name the account through `claimed_account_id`;
//! - the token endpoint expects HTTP Basic client authentication;
//! - the profile is the `Contacts/Me` record of the account's API.

#![warn(missing_docs)]

mod config;

pub use config::WildApricotConfig;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;
use wildauth_core::{
    utils, AuthError, ClientDescriptor, Identity, IdentityExtra, IdentityInfo, OAuthStrategy,
    OAuthToken, Params, RawProfile, TokenRequest,
};

/// Provider identifier.
pub const PROVIDER_ID: &str = "wild_apricot";
/// Scope requested for every login.
pub const DEFAULT_SCOPE: &str = "contacts_me";
/// Login page, relative to the organization's site.
pub const AUTHORIZE_URL: &str = "/sys/login/OAuthLogin";
/// Base URL of the v2 API.
pub const BASE_API_URL: &str = "https://api.wildapricot.org/v2";
/// Token endpoint.
pub const TOKEN_URL: &str = "https://oauth.wildapricot.org/auth/token";

/// Wild Apricot OAuth2 strategy.
#[derive(Debug, Clone)]
pub struct WildApricotProvider {
    config: WildApricotConfig,
    token_url: String,
    api_base_url: String,
}

impl WildApricotProvider {
    /// Create a provider, validating the configuration.
    pub fn new(config: WildApricotConfig) -> Result<Self, AuthError> {
        config.validate()?;
        Ok(Self {
            config,
            token_url: TOKEN_URL.to_string(),
            api_base_url: BASE_API_URL.to_string(),
        })
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Override the API base URL the profile is read from.
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// The configuration this provider was built from.
    pub fn config(&self) -> &WildApricotConfig {
        &self.config
    }

    /// URL of the signed-in contact's record.
    pub fn contact_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Contacts/Me",
            self.api_base_url.trim_end_matches('/'),
            self.config.account_number
        )
    }

    fn authorization_header(&self) -> Result<HeaderValue, AuthError> {
        let value = utils::basic_authorization(&self.config.client_id, &self.config.client_secret);
        HeaderValue::from_str(&value).map_err(|_| {
            AuthError::Configuration("client credentials are not valid in a header".into())
        })
    }
}

#[async_trait]
impl OAuthStrategy for WildApricotProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn client_descriptor(&self) -> ClientDescriptor {
        ClientDescriptor {
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            site: self.config.site.clone(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: self.token_url.clone(),
        }
    }

    fn authorize_params(&self, base: Params) -> Params {
        base.merge(
            Params::new()
                .with("scope", DEFAULT_SCOPE)
                .with("response_type", "authorization_code")
                .with("claimed_account_id", self.config.account_number.as_str()),
        )
    }

    fn token_request(&self, mut base: TokenRequest) -> Result<TokenRequest, AuthError> {
        base.params.insert("scope", DEFAULT_SCOPE);
        base.headers.insert(AUTHORIZATION, self.authorization_header()?);
        Ok(base)
    }

    async fn fetch_raw_profile(
        &self,
        http: &reqwest::Client,
        token: &OAuthToken,
    ) -> Result<RawProfile, AuthError> {
        let url = self.contact_url();
        log::debug!("fetching Wild Apricot contact from {url}");

        let response = http
            .get(&url)
            .bearer_auth(&token.access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let response = utils::ensure_success(response).await.inspect_err(|e| {
            log::warn!("Wild Apricot contact request failed: {e}");
        })?;

        let body = response.text().await?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(profile)) => Ok(profile),
            Ok(other) => Err(AuthError::MalformedResponse(format!(
                "expected a contact object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(AuthError::MalformedResponse(format!("contact response: {e}"))),
        }
    }

    fn normalize(&self, raw: &RawProfile) -> Identity {
        normalize(raw)
    }

    fn request_timeout(&self) -> Option<Duration> {
        Some(self.config.request_timeout())
    }
}

/// Map a `Contacts/Me` record onto an [`Identity`].
///
/// Never fails: missing fields become empty and scalar fields are stringified. `name` is
/// always first and last name joined by a single space, so a missing last name leaves a
/// trailing space.
pub fn normalize(raw: &RawProfile) -> Identity {
    let first_name = string_field(raw, "FirstName");
    let last_name = string_field(raw, "LastName");
    let name = format!(
        "{} {}",
        first_name.as_deref().unwrap_or_default(),
        last_name.as_deref().unwrap_or_default()
    );

    Identity {
        provider_id: PROVIDER_ID.to_string(),
        uid: raw.get("Id").map(scalar_to_string).unwrap_or_default(),
        info: IdentityInfo {
            email: string_field(raw, "Email"),
            first_name,
            last_name,
            name,
        },
        extra: IdentityExtra {
            raw_info: raw.clone(),
        },
    }
}

fn string_field(raw: &RawProfile, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        scalar => Some(scalar_to_string(scalar)),
    }
}

// Ids arrive as numbers; strings pass through unquoted.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
