//! Composition root.
//!
//! Builds one cookie jar and one HTTP client, then wires the token store,
//! the API client and the auth service on top of them. Nothing in the crate
//! is a global; applications own a [`Session`] and hand out clones.

use std::sync::Arc;

use reqwest::cookie::Jar;
use url::Url;

use crate::auth::AuthService;
use crate::client::ApiClient;
use crate::clock::Clock;
use crate::config::{Config, api};
use crate::cookies::JarCookieClearer;
use crate::navigator::{LogNavigator, LoginNavigator};
use crate::storage::KeyValueStore;
use crate::token::TokenStore;

/// A fully wired client session.
#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<Config>,
    tokens: TokenStore,
    api: ApiClient,
    auth: AuthService,
}

impl Session {
    /// Build a session with default collaborators.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Self::builder(config).build()
    }

    /// Start building a session with custom collaborators.
    #[must_use]
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            navigator: Arc::new(LogNavigator),
            durable: None,
            clock: None,
        }
    }

    /// Token store.
    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Authenticated API client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Login/logout service.
    #[must_use]
    pub const fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Configuration the session was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: Config,
    navigator: Arc<dyn LoginNavigator>,
    durable: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionBuilder {
    /// Navigator invoked when the session is lost.
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn LoginNavigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Durable store replacing the configured token file.
    #[must_use]
    pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Time source for expiry bookkeeping.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wire everything together.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn build(self) -> anyhow::Result<Session> {
        let config = self.config;
        config.validate()?;

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let refresh_url = Url::parse(&config.refresh_url())?;
        let clearer = JarCookieClearer::new(Arc::clone(&jar), refresh_url, config.refresh_cookie.clone());

        let mut tokens = TokenStore::builder(&config)
            .http_client(http.clone())
            .cookie_clearer(Arc::new(clearer));
        if let Some(durable) = self.durable {
            tokens = tokens.durable_store(durable);
        }
        if let Some(clock) = self.clock {
            tokens = tokens.clock(clock);
        }
        let tokens = tokens.build()?;

        let api = ApiClient::new(&config, http, tokens.clone(), self.navigator);
        let auth = AuthService::new(&config, api.clone());

        tracing::debug!(
            base_url = %config.api_base_url,
            persistence = ?config.persistence,
            "session initialised"
        );

        Ok(Session { config: Arc::new(config), tokens, api, auth })
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder").field("config", &self.config).finish()
    }
}
