use tokio::sync::OnceCell;
use wildauth_core::{AuthError, Identity, OAuthStrategy, OAuthToken, RawProfile};

/// State of one authentication attempt after the code exchange.
///
/// The raw profile is fetched on first use and cached for the rest of the attempt, so
/// reading the uid, the identity and the raw profile costs a single request. Nothing is
/// shared between attempts.
pub struct AuthAttempt<'a, S: OAuthStrategy + ?Sized> {
    strategy: &'a S,
    http: &'a reqwest::Client,
    token: OAuthToken,
    raw_info: OnceCell<RawProfile>,
}

impl<'a, S: OAuthStrategy + ?Sized> AuthAttempt<'a, S> {
    /// Start an attempt for an access token issued to `strategy`'s client.
    pub fn new(strategy: &'a S, http: &'a reqwest::Client, token: OAuthToken) -> Self {
        Self {
            strategy,
            http,
            token,
            raw_info: OnceCell::new(),
        }
    }

    /// The provider's raw profile record, fetched at most once.
    pub async fn raw_info(&self) -> Result<&RawProfile, AuthError> {
        self.raw_info
            .get_or_try_init(|| async {
                log::debug!(
                    "fetching raw profile from provider '{}'",
                    self.strategy.provider_id()
                );
                self.strategy.fetch_raw_profile(self.http, &self.token).await
            })
            .await
    }

    /// Provider-scoped user id.
    pub async fn uid(&self) -> Result<String, AuthError> {
        Ok(self.identity().await?.uid)
    }

    /// The normalized identity.
    pub async fn identity(&self) -> Result<Identity, AuthError> {
        let raw = self.raw_info().await?;
        Ok(self.strategy.normalize(raw))
    }

    /// End the attempt, keeping only the token.
    pub fn into_token(self) -> OAuthToken {
        self.token
    }
}
