//! Configuration for the hotel session client.

use std::path::PathBuf;
use std::time::Duration;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// Default base URL of the hotel management REST API.
    pub const BASE_URL: &str = "http://localhost:8080/api";

    /// Refresh endpoint, relative to the base URL.
    pub const REFRESH_PATH: &str = "/auth/refresh";

    /// Login endpoint, relative to the base URL.
    pub const LOGIN_PATH: &str = "/auth/login";

    /// Logout endpoint, relative to the base URL.
    pub const LOGOUT_PATH: &str = "/auth/logout";

    /// Login entry point the user is sent to when the session is lost.
    pub const LOGIN_PAGE: &str = "/login";

    /// Name of the HTTP-only cookie carrying the refresh token.
    pub const REFRESH_COOKIE: &str = "refreshToken";

    /// Lifetime assumed when the server omits `expiresIn` (10 minutes).
    pub const DEFAULT_EXPIRES_IN_SECS: i64 = 600;

    /// Request timeout, applied to refresh calls as well.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Default location of the durable token file.
    pub const STORAGE_FILE: &str = ".hotel-session/tokens.json";
}

/// Where access tokens may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Tokens are kept in process memory only.
    #[default]
    MemoryOnly,
    /// Tokens are mirrored to the durable key/value store.
    MemoryAndDurable,
}

impl std::str::FromStr for PersistenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "memory-only" | "memory_only" => Ok(Self::MemoryOnly),
            "durable" | "memory-and-durable" | "memory_and_durable" | "file" => {
                Ok(Self::MemoryAndDurable)
            }
            other => Err(format!("unknown persistence mode: {other}")),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL every relative endpoint is appended to.
    pub api_base_url: String,

    /// Refresh endpoint path.
    pub refresh_path: String,

    /// Login endpoint path.
    pub login_path: String,

    /// Logout endpoint path.
    pub logout_path: String,

    /// Login entry point used for the hard redirect.
    pub login_page: String,

    /// Refresh cookie name.
    pub refresh_cookie: String,

    /// Token lifetime when the server does not send one.
    pub default_expires_in: i64,

    /// Persistence mode, fixed for the lifetime of the token store.
    pub persistence: PersistenceMode,

    /// Durable token file (used with [`PersistenceMode::MemoryAndDurable`]).
    pub storage_path: PathBuf,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Retries for transient transport failures on ordinary requests (0 = off).
    pub max_transient_retries: u32,
}

impl Config {
    /// Create a configuration for the given API base URL.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            refresh_path: api::REFRESH_PATH.to_string(),
            login_path: api::LOGIN_PATH.to_string(),
            logout_path: api::LOGOUT_PATH.to_string(),
            login_page: api::LOGIN_PAGE.to_string(),
            refresh_cookie: api::REFRESH_COOKIE.to_string(),
            default_expires_in: api::DEFAULT_EXPIRES_IN_SECS,
            persistence: PersistenceMode::MemoryOnly,
            storage_path: PathBuf::from(api::STORAGE_FILE),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            max_transient_retries: 0,
        }
    }

    /// Create a test configuration pointing at a mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Self::new(base_url)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let base = std::env::var("HOTEL_API_BASE_URL").unwrap_or_else(|_| api::BASE_URL.into());
        let mut config = Self::new(base);

        if let Ok(mode) = std::env::var("HOTEL_TOKEN_STORAGE") {
            config.persistence = mode.parse().map_err(anyhow::Error::msg)?;
        }
        if let Ok(path) = std::env::var("HOTEL_TOKEN_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("HOTEL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.parse()?);
        }
        if let Ok(retries) = std::env::var("HOTEL_TRANSIENT_RETRIES") {
            config.max_transient_retries = retries.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the base URL is a usable absolute URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        let parsed = url::Url::parse(&self.api_base_url)?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot be a base: {}", self.api_base_url);
        }
        Ok(())
    }

    /// Absolute URL for an endpoint path.
    ///
    /// Absolute URLs are passed through unchanged; see [`Config::is_api_origin`].
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    /// Absolute refresh endpoint URL.
    #[must_use]
    pub fn refresh_url(&self) -> String {
        self.endpoint_url(&self.refresh_path)
    }

    /// Whether `url` shares scheme, host and port with the API base URL.
    ///
    /// Credentials are only ever attached to requests for which this holds.
    #[must_use]
    pub fn is_api_origin(&self, url: &url::Url) -> bool {
        url::Url::parse(&self.api_base_url).is_ok_and(|base| base.origin() == url.origin())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(api::BASE_URL)
    }
}
