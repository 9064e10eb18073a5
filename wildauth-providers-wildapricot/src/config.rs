use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use wildauth_core::AuthError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for one Wild Apricot application registration.
///
/// Resolved once, before the first request, and read-only afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildApricotConfig {
    /// Client id of the authorized application.
    pub client_id: String,
    /// Client secret of the authorized application.
    pub client_secret: String,
    /// Wild Apricot account the login is scoped to.
    #[serde(alias = "account_num")]
    pub account_number: String,
    /// Base URL of the organization's Wild Apricot site, e.g. `https://myorg.wildapricot.org`.
    pub site: String,
    /// Timeout for each outbound request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl WildApricotConfig {
    /// Create a configuration with the default request timeout.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        account_number: impl Into<String>,
        site: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            account_number: account_number.into(),
            site: site.into(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read the configuration from `WILD_APRICOT_*` environment variables.
    ///
    /// `WILD_APRICOT_CLIENT_ID`, `WILD_APRICOT_CLIENT_SECRET`, `WILD_APRICOT_ACCOUNT_NUM` and
    /// `WILD_APRICOT_SITE` are required; `WILD_APRICOT_TIMEOUT_SECS` is optional.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`WildApricotConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| AuthError::Configuration(format!("{key} is not set")))
        };

        let request_timeout_secs = match lookup("WILD_APRICOT_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                AuthError::Configuration(format!(
                    "WILD_APRICOT_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            client_id: required("WILD_APRICOT_CLIENT_ID")?,
            client_secret: required("WILD_APRICOT_CLIENT_SECRET")?,
            account_number: required("WILD_APRICOT_ACCOUNT_NUM")?,
            site: required("WILD_APRICOT_SITE")?,
            request_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), AuthError> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("account_number", &self.account_number),
            ("site", &self.site),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::Configuration(format!(
                    "Wild Apricot {name} must not be empty"
                )));
            }
        }

        let site = url::Url::parse(&self.site).map_err(|e| {
            AuthError::Configuration(format!("Wild Apricot site '{}' is not a URL: {e}", self.site))
        })?;
        if !matches!(site.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "Wild Apricot site '{}' must use http or https",
                self.site
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(AuthError::Configuration(
                "request timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Timeout for each outbound request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for WildApricotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildApricotConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("account_number", &self.account_number)
            .field("site", &self.site)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
