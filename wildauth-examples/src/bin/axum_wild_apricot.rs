//! # Axum Wild Apricot Example
//!
//! Signs members in with their Wild Apricot account.
//!
//! Configure through the environment (or a `.env` file):
//! `WILD_APRICOT_CLIENT_ID`, `WILD_APRICOT_CLIENT_SECRET`, `WILD_APRICOT_ACCOUNT_NUM`,
//! `WILD_APRICOT_SITE` and optionally `APP_URL` (defaults to `http://localhost:3000`).
//!
//! `/auth/wild_apricot` redirects to the organization's login page and remembers the CSRF
//! state in a cookie; the callback completes the flow and returns the identity and the token
//! expiry as JSON.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};
use tracing_subscriber::EnvFilter;
use wildauth_core::{AuthError, CallbackContext, Identity, OAuthStrategy};
use wildauth_flow::OAuth2Flow;
use wildauth_providers_wildapricot::{WildApricotConfig, WildApricotProvider};

const STATE_COOKIE: &str = "wildauth_state";
const LOGIN_PATH: &str = "/auth/wild_apricot";
const CALLBACK_PATH: &str = "/auth/wild_apricot/callback";

#[derive(Clone)]
struct AppState {
    flow: Arc<OAuth2Flow<WildApricotProvider>>,
}

struct AppError(AuthError);

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log::warn!("Wild Apricot login failed: {}", self.0);
        let (status, message) = match self.0 {
            AuthError::CsrfMismatch => (StatusCode::BAD_REQUEST, "Login state mismatch"),
            AuthError::ExternalService { .. }
            | AuthError::MalformedResponse(_)
            | AuthError::Network(_) => (StatusCode::BAD_GATEWAY, "Wild Apricot rejected the login"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Login failed"),
        };
        (status, message).into_response()
    }
}

#[derive(serde::Serialize)]
struct LoginResponse {
    identity: Identity,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    code: String,
    state: String,
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(LOGIN_PATH, get(login))
        .route(CALLBACK_PATH, get(callback))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider = WildApricotProvider::new(WildApricotConfig::from_env()?)?;

    let full_host = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let redirect_uri = provider.callback_url(&CallbackContext::new(full_host, "", CALLBACK_PATH));
    let flow = OAuth2Flow::new(provider, redirect_uri)?;
    log::info!(
        "signing members in through {} (callback {})",
        flow.strategy().config().site,
        flow.redirect_uri()
    );

    let state = AppState {
        flow: Arc::new(flow),
    };

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Html(format!(
        "<h1>Wildauth</h1><p><a href=\"{LOGIN_PATH}\">Log in with Wild Apricot</a></p>"
    ))
}

async fn login(State(state): State<AppState>, cookies: Cookies) -> Result<Redirect, AppError> {
    let (url, csrf_state) = state.flow.initiate_login()?;
    cookies.add(
        Cookie::build((STATE_COOKIE, csrf_state))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    );
    Ok(Redirect::to(&url))
}

async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<CallbackParams>,
) -> Result<Json<LoginResponse>, AppError> {
    let expected_state = cookies
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::CsrfMismatch)?;
    cookies.remove(Cookie::build(STATE_COOKIE).path("/").build());

    let issued_at = Utc::now();
    let (identity, token, _) = state
        .flow
        .finalize_login(&params.code, &params.state, &expected_state)
        .await?;
    log::info!("member {} signed in", identity.uid);
    Ok(Json(LoginResponse {
        identity,
        expires_at: token.expires_at(issued_at),
    }))
}
