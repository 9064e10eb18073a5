use crate::attempt::AuthAttempt;
use async_trait::async_trait;
use std::time::Duration;
use wildauth_core::{
    utils, AuthError, ErasedOAuthFlow, Identity, OAuthStrategy, OAuthToken, Params, TokenRequest,
    UserMapper,
};

/// Timeout applied to every outbound request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates the standard OAuth2 Authorization Code flow for one strategy.
pub struct OAuth2Flow<S: OAuthStrategy, M: UserMapper = ()> {
    strategy: S,
    mapper: Option<M>,
    http: reqwest::Client,
    redirect_uri: String,
}

#[async_trait]
impl<S: OAuthStrategy, M: UserMapper> ErasedOAuthFlow for OAuth2Flow<S, M> {
    fn provider_id(&self) -> String {
        self.strategy.provider_id().to_string()
    }

    fn initiate_login(&self) -> Result<(String, String), AuthError> {
        self.initiate_login()
    }

    async fn finalize_login(
        &self,
        code: &str,
        received_state: &str,
        expected_state: &str,
    ) -> Result<(Identity, OAuthToken), AuthError> {
        let (identity, token, _) = self
            .finalize_login(code, received_state, expected_state)
            .await?;
        Ok((identity, token))
    }
}

impl<S: OAuthStrategy> OAuth2Flow<S, ()> {
    /// Create a new `OAuth2Flow` for `strategy`, redirecting back to `redirect_uri`.
    ///
    /// Outbound requests use the strategy's configured timeout, or [`DEFAULT_TIMEOUT`].
    pub fn new(strategy: S, redirect_uri: impl Into<String>) -> Result<Self, AuthError> {
        let timeout = strategy.request_timeout().unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            strategy,
            mapper: None,
            http: build_client(timeout)?,
            redirect_uri: redirect_uri.into(),
        })
    }
}

impl<S: OAuthStrategy, M: UserMapper> OAuth2Flow<S, M> {
    /// Attach a user mapper, run after every successful login.
    pub fn with_mapper<N: UserMapper>(self, mapper: N) -> OAuth2Flow<S, N> {
        OAuth2Flow {
            strategy: self.strategy,
            mapper: Some(mapper),
            http: self.http,
            redirect_uri: self.redirect_uri,
        }
    }

    /// Replace the request timeout used for the token exchange and the profile fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AuthError> {
        self.http = build_client(timeout)?;
        Ok(self)
    }

    /// The strategy this flow drives.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// The redirect URI sent with both the authorization and the token request.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the provider authorization URL for the given CSRF state.
    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let client = self.strategy.client_descriptor();
        let base = Params::new()
            .with("client_id", client.client_id.as_str())
            .with("redirect_uri", self.redirect_uri.as_str())
            .with("response_type", "code")
            .with("state", state);
        let params = self.strategy.authorize_params(base);

        let mut url = client.authorize_endpoint()?;
        url.query_pairs_mut().extend_pairs(params.iter());
        Ok(url.into())
    }

    /// Generates the redirect URL and CSRF state.
    pub fn initiate_login(&self) -> Result<(String, String), AuthError> {
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.authorization_url(&state)?;
        Ok((url, state))
    }

    /// Build the token request for an authorization code.
    ///
    /// The default body carries the client credentials; strategies may add headers such
    /// as HTTP Basic client authentication on top.
    pub fn token_request(&self, code: &str) -> Result<TokenRequest, AuthError> {
        let client = self.strategy.client_descriptor();
        let base = Params::new()
            .with("grant_type", "authorization_code")
            .with("code", code)
            .with("redirect_uri", self.redirect_uri.as_str())
            .with("client_id", client.client_id)
            .with("client_secret", client.client_secret);
        self.strategy.token_request(TokenRequest::new(base))
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken, AuthError> {
        let request = self.token_request(code)?;
        let endpoint = self.strategy.client_descriptor().token_endpoint()?;
        log::debug!(
            "exchanging authorization code for provider '{}' at {}",
            self.strategy.provider_id(),
            endpoint
        );

        let response = self
            .http
            .post(endpoint)
            .headers(request.headers)
            .form(&request.params)
            .send()
            .await?;
        let response = utils::ensure_success(response).await.inspect_err(|e| {
            log::warn!(
                "token endpoint of provider '{}' rejected the code: {}",
                self.strategy.provider_id(),
                e
            );
        })?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(format!("token response: {e}")))
    }

    /// Start a per-attempt context for an access token.
    pub fn begin_attempt(&self, token: OAuthToken) -> AuthAttempt<'_, S> {
        AuthAttempt::new(&self.strategy, &self.http, token)
    }

    /// Completes the flow by exchanging the code.
    /// If a mapper is provided, it will also map the identity to a local user.
    pub async fn finalize_login(
        &self,
        code: &str,
        received_state: &str,
        expected_state: &str,
    ) -> Result<(Identity, OAuthToken, Option<M::LocalUser>), AuthError> {
        if expected_state.is_empty() || received_state != expected_state {
            log::warn!(
                "rejecting callback for provider '{}': state mismatch",
                self.strategy.provider_id()
            );
            return Err(AuthError::CsrfMismatch);
        }

        let token = self.exchange_code(code).await?;
        let attempt = self.begin_attempt(token);
        let identity = attempt.identity().await?;
        let token = attempt.into_token();

        let local_user = if let Some(mapper) = &self.mapper {
            Some(mapper.map_user(&identity).await?)
        } else {
            None
        };

        Ok((identity, token, local_user))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wildauth_core::{ClientDescriptor, IdentityExtra, IdentityInfo, RawProfile};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) struct StubStrategy {
        site: String,
    }

    impl StubStrategy {
        pub(crate) fn new(site: &str) -> Self {
            Self {
                site: site.to_string(),
            }
        }
    }

    #[async_trait]
    impl OAuthStrategy for StubStrategy {
        fn provider_id(&self) -> &str {
            "stub"
        }

        fn client_descriptor(&self) -> ClientDescriptor {
            ClientDescriptor {
                client_id: "client".into(),
                client_secret: "secret".into(),
                site: self.site.clone(),
                authorize_url: "/authorize".into(),
                token_url: "/token".into(),
            }
        }

        fn authorize_params(&self, base: Params) -> Params {
            base.merge(Params::new().with("scope", "profile"))
        }

        fn token_request(&self, mut base: TokenRequest) -> Result<TokenRequest, AuthError> {
            base.headers
                .insert("x-stub", reqwest::header::HeaderValue::from_static("1"));
            Ok(base)
        }

        async fn fetch_raw_profile(
            &self,
            http: &reqwest::Client,
            token: &OAuthToken,
        ) -> Result<RawProfile, AuthError> {
            let response = http
                .get(format!("{}/me", self.site))
                .bearer_auth(&token.access_token)
                .send()
                .await?;
            let response = utils::ensure_success(response).await?;
            Ok(response.json::<RawProfile>().await?)
        }

        fn normalize(&self, raw: &RawProfile) -> Identity {
            Identity {
                provider_id: "stub".into(),
                uid: raw
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                info: IdentityInfo::default(),
                extra: IdentityExtra {
                    raw_info: raw.clone(),
                },
            }
        }
    }

    struct CountingMapper(AtomicUsize);

    #[async_trait]
    impl UserMapper for CountingMapper {
        type LocalUser = String;

        async fn map_user(&self, identity: &Identity) -> Result<String, AuthError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("local-{}", identity.uid))
        }
    }

    async fn mount_token(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn authorization_url_carries_base_and_strategy_params() {
        let flow = OAuth2Flow::new(
            StubStrategy::new("https://id.example.com"),
            "https://app.example.com/cb",
        )
        .unwrap();

        let url = reqwest::Url::parse(&flow.authorization_url("xyz").unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(pairs["client_id"], "client");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/cb");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["scope"], "profile");
    }

    #[test]
    fn initiate_login_issues_fresh_state() {
        let flow = OAuth2Flow::new(StubStrategy::new("https://id.example.com"), "/cb").unwrap();
        let (url_a, state_a) = flow.initiate_login().unwrap();
        let (_, state_b) = flow.initiate_login().unwrap();

        assert_ne!(state_a, state_b);
        assert!(url_a.contains(&format!("state={state_a}")));
    }

    #[test]
    fn token_request_keeps_body_credentials_and_strategy_headers() {
        let flow = OAuth2Flow::new(StubStrategy::new("https://id.example.com"), "/cb").unwrap();
        let request = flow.token_request("the-code").unwrap();

        assert_eq!(request.params.get("grant_type"), Some("authorization_code"));
        assert_eq!(request.params.get("code"), Some("the-code"));
        assert_eq!(request.params.get("redirect_uri"), Some("/cb"));
        assert_eq!(request.params.get("client_id"), Some("client"));
        assert_eq!(request.params.get("client_secret"), Some("secret"));
        assert_eq!(request.headers.get("x-stub").unwrap(), "1");
    }

    #[tokio::test]
    async fn finalize_login_exchanges_code_fetches_profile_and_maps_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("x-stub", "1"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 1800
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "u-7" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "https://app/cb")
            .unwrap()
            .with_mapper(CountingMapper(AtomicUsize::new(0)));

        let (identity, token, local) = flow.finalize_login("abc", "s", "s").await.unwrap();

        assert_eq!(identity.uid, "u-7");
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, Some(1800));
        assert_eq!(local.as_deref(), Some("local-u-7"));
        assert_eq!(flow.mapper.as_ref().unwrap().0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn state_mismatch_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap();
        let err = flow.finalize_login("abc", "forged", "s").await.unwrap_err();

        assert!(matches!(err, AuthError::CsrfMismatch));
    }

    #[tokio::test]
    async fn empty_expected_state_is_never_accepted() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap();
        let err = flow.finalize_login("abc", "", "").await.unwrap_err();

        assert!(matches!(err, AuthError::CsrfMismatch));
    }

    #[tokio::test]
    async fn rejected_code_skips_profile_fetch() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            400,
            serde_json::json!({ "error": "invalid_grant" }),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap();
        let err = flow.finalize_login("abc", "s", "s").await.unwrap_err();

        match err {
            AuthError::ExternalService { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected ExternalService, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_without_access_token_is_malformed() {
        let server = MockServer::start().await;
        mount_token(&server, 200, serde_json::json!({ "token_type": "Bearer" })).await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap();
        let err = flow.exchange_code("abc").await.unwrap_err();

        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn slow_token_endpoint_hits_the_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({ "access_token": "tok" })),
            )
            .mount(&server)
            .await;

        let flow = OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb")
            .unwrap()
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let err = flow.exchange_code("abc").await.unwrap_err();

        assert!(matches!(err, AuthError::Network(_)));
    }

    #[tokio::test]
    async fn erased_flow_forwards_to_the_driver() {
        let server = MockServer::start().await;
        mount_token(&server, 401, serde_json::json!({ "error": "invalid_client" })).await;

        let shared: std::sync::Arc<dyn ErasedOAuthFlow> =
            std::sync::Arc::new(OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap());
        let boxed: Box<dyn ErasedOAuthFlow> =
            Box::new(OAuth2Flow::new(StubStrategy::new(&server.uri()), "/cb").unwrap());

        assert_erased_flow(shared, &server.uri()).await;
        assert_erased_flow(boxed, &server.uri()).await;
    }

    async fn assert_erased_flow(flow: impl ErasedOAuthFlow, site: &str) {
        assert_eq!(flow.provider_id(), "stub");
        let (url, state) = flow.initiate_login().unwrap();
        assert!(url.starts_with(&format!("{site}/authorize?")));

        let err = flow.finalize_login("abc", &state, &state).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
