//! # Wildauth Core
//!
//! `wildauth-core` provides the foundational traits and types shared by the wildauth crates.
//! It defines the narrow interface a provider strategy implements ([`OAuthStrategy`]), the
//! identity and token records produced by an authentication attempt, and the error type
//! every step propagates.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::time::Duration;

/// Errors that can occur during the authentication process.
pub mod error;
pub use crate::error::AuthError;

/// Request, token and identity records exchanged between the flow driver and a strategy.
pub mod state;
pub use crate::state::{
    CallbackContext, ClientDescriptor, Identity, IdentityExtra, IdentityInfo, OAuthToken, Params,
    RawProfile, TokenRequest,
};

/// Header and response helpers shared by the flow driver and strategies.
pub mod utils;

/// Provider-specific half of an OAuth2 Authorization Code flow.
///
/// A strategy never drives the flow itself. The flow driver calls it at fixed points:
/// once to describe the client, once to adjust the authorization request, once to adjust
/// the token request, and then to fetch and normalize the user's profile.
#[async_trait]
pub trait OAuthStrategy: Send + Sync {
    /// Get the provider identifier.
    fn provider_id(&self) -> &str;

    /// Client credentials and endpoints used by the driver.
    fn client_descriptor(&self) -> ClientDescriptor;

    /// Merge provider parameters over the driver's default authorization parameters.
    fn authorize_params(&self, base: Params) -> Params;

    /// Merge provider parameters and headers over the driver's default token request.
    fn token_request(&self, base: TokenRequest) -> Result<TokenRequest, AuthError>;

    /// Fetch the raw profile of the user the access token belongs to.
    async fn fetch_raw_profile(
        &self,
        http: &reqwest::Client,
        token: &OAuthToken,
    ) -> Result<RawProfile, AuthError>;

    /// Map a raw profile onto the canonical identity record.
    fn normalize(&self, raw: &RawProfile) -> Identity;

    /// Build the callback URL the provider redirects back to.
    fn callback_url(&self, ctx: &CallbackContext) -> String {
        ctx.callback_url()
    }

    /// Timeout for the token exchange and the profile fetch, if the provider configures one.
    fn request_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Trait for mapping a provider identity to a local user.
#[async_trait]
pub trait UserMapper: Send + Sync {
    /// The type of the local user object.
    type LocalUser: Send + Sync;

    /// Map an identity to a local user.
    /// This could involve creating a new user or finding an existing one.
    async fn map_user(&self, identity: &Identity) -> Result<Self::LocalUser, AuthError>;
}

/// Orchestrates the Authorization Code flow behind a trait object.
#[async_trait]
pub trait ErasedOAuthFlow: Send + Sync {
    /// Get the provider identifier.
    fn provider_id(&self) -> String;
    /// Generates the redirect URL and CSRF state.
    fn initiate_login(&self) -> Result<(String, String), AuthError>;
    /// Completes the flow by exchanging the code.
    async fn finalize_login(
        &self,
        code: &str,
        received_state: &str,
        expected_state: &str,
    ) -> Result<(Identity, OAuthToken), AuthError>;
}

#[async_trait]
impl UserMapper for () {
    type LocalUser = ();
    async fn map_user(&self, _identity: &Identity) -> Result<Self::LocalUser, AuthError> {
        Ok(())
    }
}

#[async_trait]
impl<T: ErasedOAuthFlow + ?Sized> ErasedOAuthFlow for std::sync::Arc<T> {
    fn provider_id(&self) -> String {
        (**self).provider_id()
    }

    fn initiate_login(&self) -> Result<(String, String), AuthError> {
        (**self).initiate_login()
    }

    async fn finalize_login(
        &self,
        code: &str,
        received_state: &str,
        expected_state: &str,
    ) -> Result<(Identity, OAuthToken), AuthError> {
        (**self)
            .finalize_login(code, received_state, expected_state)
            .await
    }
}

#[async_trait]
impl<T: ErasedOAuthFlow + ?Sized> ErasedOAuthFlow for Box<T> {
    fn provider_id(&self) -> String {
        (**self).provider_id()
    }

    fn initiate_login(&self) -> Result<(String, String), AuthError> {
        (**self).initiate_login()
    }

    async fn finalize_login(
        &self,
        code: &str,
        received_state: &str,
        expected_state: &str,
    ) -> Result<(Identity, OAuthToken), AuthError> {
        (**self)
            .finalize_login(code, received_state, expected_state)
            .await
    }
}
