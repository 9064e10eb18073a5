//! # Wildauth Flow
//!
//! `wildauth-flow` drives the OAuth2 Authorization Code flow for a single [`OAuthStrategy`].
//! The driver owns everything that is not provider specific: CSRF state, the default
//! authorization and token parameters, the HTTP client and its timeout, and the code
//! exchange. The strategy only adjusts requests and interprets the profile.
//!
//! ## Key Components
//!
//! - **[`OAuth2Flow`]**: Builds the authorization redirect and completes the callback.
//! - **[`AuthAttempt`]**: Per-attempt context holding the access token and the memoized raw profile.

#![warn(missing_docs)]

pub use wildauth_core::{ErasedOAuthFlow, OAuthStrategy, UserMapper};

/// Per-attempt context.
pub mod attempt;
/// OAuth2 Authorization Code flow implementation.
pub mod oauth2;

pub use attempt::AuthAttempt;
pub use oauth2::{OAuth2Flow, DEFAULT_TIMEOUT};
