//! Access token store.
//!
//! Single source of truth for the current access token and the only place
//! where refresh concurrency is arbitrated:
//! - value and expiry are installed together under one lock
//! - a self-clearing timer drops the token once it expires
//! - concurrent refresh demands share one network round-trip
//! - durable mirroring is best-effort and never raises

pub mod expiry;
pub mod refresh;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, PersistenceMode};
use crate::cookies::{NoopCookieClearer, RefreshCookieClearer};
use crate::error::{ClientResult, RefreshError, RefreshResult, StorageError};
use crate::storage::{ACCESS_TOKEN_EXPIRY_KEY, ACCESS_TOKEN_KEY, FileKeyValueStore, KeyValueStore};

use self::expiry::ExpiryTimer;

pub use self::refresh::TokenGrant;

type RefreshFlight = Shared<BoxFuture<'static, RefreshResult<String>>>;

/// Format a token as an `Authorization` header value.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct TokenState {
    value: Option<String>,
    /// Epoch milliseconds; 0 means "already expired".
    expires_at_ms: i64,
    /// Bumped on every install or clear so stale timers can tell.
    generation: u64,
    /// Armed for `generation`; replaced under the same lock.
    timer: Option<ExpiryTimer>,
}

struct Inner {
    http: reqwest::Client,
    refresh_url: String,
    request_timeout: Duration,
    default_expires_in: i64,
    persistence: PersistenceMode,
    durable: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    cookies: Arc<dyn RefreshCookieClearer>,
    state: Mutex<TokenState>,
    in_flight: Mutex<Option<RefreshFlight>>,
    storage_failures: AtomicU64,
}

impl Inner {
    fn install_until(self: &Arc<Self>, value: &str, expires_at_ms: i64, persist: bool) {
        let ttl_ms = expires_at_ms.saturating_sub(self.clock.now_ms());

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            let generation = state.generation;
            state.value = Some(value.to_string());
            state.expires_at_ms = expires_at_ms;
            state.timer = if ttl_ms > 0 {
                let weak = Arc::downgrade(self);
                ExpiryTimer::spawn(Duration::from_millis(ttl_ms as u64), move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.expire(generation);
                    }
                })
            } else {
                None
            };
            generation
        };

        if persist {
            self.persist(value, expires_at_ms);
        }

        tracing::debug!(ttl_ms, generation, persisted = persist, "access token installed");
    }

    fn expire(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation == generation && state.value.is_some() {
            state.value = None;
            state.expires_at_ms = 0;
            tracing::debug!(generation, "access token expired");
        }
    }

    fn clear_memory(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.value = None;
        state.expires_at_ms = 0;
        state.timer = None;
    }

    fn persist(&self, value: &str, expires_at_ms: i64) {
        let Some(durable) = &self.durable else {
            return;
        };
        let result = durable
            .set(ACCESS_TOKEN_KEY, value)
            .and_then(|()| durable.set(ACCESS_TOKEN_EXPIRY_KEY, &expires_at_ms.to_string()));
        if let Err(err) = result {
            self.storage_failed("write", &err);
        }
    }

    fn forget_durable(&self) {
        let Some(durable) = &self.durable else {
            return;
        };
        for key in [ACCESS_TOKEN_KEY, ACCESS_TOKEN_EXPIRY_KEY] {
            if let Err(err) = durable.remove(key) {
                self.storage_failed("remove", &err);
            }
        }
    }

    fn read_durable(&self, key: &str) -> Option<String> {
        let durable = self.durable.as_ref()?;
        match durable.get(key) {
            Ok(value) => value,
            Err(err) => {
                self.storage_failed("read", &err);
                None
            }
        }
    }

    fn storage_failed(&self, operation: &'static str, err: &StorageError) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            target: "hotel_session::storage",
            operation,
            error = %err,
            "durable token storage failed, continuing in memory"
        );
    }

    async fn run_refresh(self: Arc<Self>) -> RefreshResult<String> {
        tracing::debug!(url = %self.refresh_url, "refreshing access token");

        let outcome = refresh::request_grant(&self.http, &self.refresh_url, self.request_timeout)
            .await
            .and_then(|grant| grant.into_parts(self.default_expires_in));

        let outcome = match outcome {
            Ok((token, expires_in)) => {
                let expires_at = self.expiry_from(expires_in);
                self.install_until(&token, expires_at, self.is_durable());
                tracing::info!(expires_in, "access token refreshed");
                Ok(token)
            }
            Err(err) => {
                tracing::warn!(error = %err, "access token refresh failed");
                self.clear_memory();
                Err(err)
            }
        };

        // Released only after the new token is visible, in both outcomes.
        lock(&self.in_flight).take();
        outcome
    }

    fn expiry_from(&self, expires_in_secs: i64) -> i64 {
        let ttl_ms = expires_in_secs.max(0).saturating_mul(1000);
        self.clock.now_ms().saturating_add(ttl_ms)
    }

    const fn is_durable(&self) -> bool {
        matches!(self.persistence, PersistenceMode::MemoryAndDurable)
    }
}

/// Handle to the session's access token.
///
/// Cheap to clone; clones share the same token, timer and in-flight refresh.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

impl TokenStore {
    /// Start building a store from the client configuration.
    #[must_use]
    pub fn builder(config: &Config) -> TokenStoreBuilder {
        TokenStoreBuilder::new(config)
    }

    /// Install a token valid for `expires_in_secs` from now.
    ///
    /// Non-positive lifetimes install an already-expired token. With
    /// [`PersistenceMode::MemoryAndDurable`] the token is also written to the
    /// durable store; write failures are logged, not raised.
    pub fn set_access_token(&self, value: impl AsRef<str>, expires_in_secs: i64) {
        let expires_at = self.inner.expiry_from(expires_in_secs);
        self.inner.install_until(value.as_ref(), expires_at, self.inner.is_durable());
    }

    /// Current valid token, falling back to the durable store.
    ///
    /// A valid durable record is adopted into memory; an expired or corrupt
    /// one is deleted.
    #[must_use]
    pub fn get_access_token(&self) -> Option<String> {
        let now = self.inner.clock.now_ms();

        {
            let mut state = lock(&self.inner.state);
            if let Some(value) = &state.value {
                if now < state.expires_at_ms {
                    return Some(value.clone());
                }
                state.value = None;
                state.expires_at_ms = 0;
                tracing::debug!("in-memory access token expired");
            }
        }

        let value = self.inner.read_durable(ACCESS_TOKEN_KEY)?;
        let expires_at = self
            .inner
            .read_durable(ACCESS_TOKEN_EXPIRY_KEY)
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        match expires_at {
            Some(expires_at) if now < expires_at => {
                self.inner.install_until(&value, expires_at, false);
                tracing::debug!("access token restored from durable storage");
                Some(value)
            }
            _ => {
                tracing::debug!("discarding expired durable access token");
                self.inner.forget_durable();
                None
            }
        }
    }

    /// Whether the in-memory expiry has passed. Does not consult durable storage.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        let now = self.inner.clock.now_ms();
        now >= lock(&self.inner.state).expires_at_ms
    }

    /// Drop the in-memory token. Durable storage is left alone.
    pub fn clear_access_token(&self) {
        self.inner.clear_memory();
    }

    /// Drop every trace of the session: memory, durable record, refresh cookie.
    pub fn clear_all_tokens(&self) {
        self.inner.clear_memory();
        self.inner.forget_durable();
        self.inner.cookies.clear_refresh_cookie();
        tracing::info!("session tokens cleared");
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// Callers arriving while a refresh is in flight join it instead of
    /// issuing another request, and all of them see the same outcome. The
    /// round-trip completes even if the caller that started it is dropped.
    /// On failure the in-memory token is cleared. Never retried here.
    pub async fn refresh_access_token(&self) -> RefreshResult<String> {
        let flight = {
            let mut slot = lock(&self.inner.in_flight);
            if let Some(existing) = slot.as_ref() {
                tracing::trace!("joining in-flight refresh");
                existing.clone()
            } else {
                // Runs on its own task so the grant is installed even if every
                // caller stops waiting.
                let task = tokio::spawn(Arc::clone(&self.inner).run_refresh());
                let inner = Arc::downgrade(&self.inner);
                let flight = async move {
                    task.await.unwrap_or_else(|err| {
                        if let Some(inner) = inner.upgrade() {
                            lock(&inner.in_flight).take();
                        }
                        Err(RefreshError::Transport(format!("refresh task failed: {err}")))
                    })
                }
                .boxed()
                .shared();
                *slot = Some(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// `Bearer <token>` for the current token, refreshing if there is none.
    ///
    /// Returns `None` when no token can be obtained; never errors.
    pub async fn get_auth_header(&self) -> Option<String> {
        if let Some(token) = self.get_access_token() {
            return Some(bearer(&token));
        }

        match self.refresh_access_token().await {
            Ok(token) => Some(bearer(&token)),
            Err(err) => {
                tracing::debug!(error = %err, "no auth header available");
                None
            }
        }
    }

    /// Whether a valid token is available.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.get_access_token().is_some()
    }

    /// Whether a refresh round-trip is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    /// Number of durable storage errors swallowed so far.
    #[must_use]
    pub fn storage_failures(&self) -> u64 {
        self.inner.storage_failures.load(Ordering::Relaxed)
    }

    /// Token lifetime applied when the server omits one.
    #[must_use]
    pub fn default_expires_in(&self) -> i64 {
        self.inner.default_expires_in
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("refresh_url", &self.inner.refresh_url)
            .field("persistence", &self.inner.persistence)
            .field("has_token", &lock(&self.inner.state).value.is_some())
            .finish()
    }
}

/// Builder for [`TokenStore`].
pub struct TokenStoreBuilder {
    http: Option<reqwest::Client>,
    refresh_url: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    default_expires_in: i64,
    persistence: PersistenceMode,
    storage_path: std::path::PathBuf,
    durable: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    cookies: Arc<dyn RefreshCookieClearer>,
}

impl TokenStoreBuilder {
    fn new(config: &Config) -> Self {
        Self {
            http: None,
            refresh_url: config.refresh_url(),
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            default_expires_in: config.default_expires_in,
            persistence: config.persistence,
            storage_path: config.storage_path.clone(),
            durable: None,
            clock: Arc::new(SystemClock),
            cookies: Arc::new(NoopCookieClearer),
        }
    }

    /// HTTP client used for refresh calls; should share the cookie jar of
    /// the dispatcher's client.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Override the persistence mode from the configuration.
    #[must_use]
    pub fn persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = mode;
        self
    }

    /// Durable store to mirror tokens into and restore them from.
    #[must_use]
    pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Refresh-cookie clearer invoked by [`TokenStore::clear_all_tokens`].
    #[must_use]
    pub fn cookie_clearer(mut self, cookies: Arc<dyn RefreshCookieClearer>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Build the store.
    ///
    /// In durable mode without an explicit store, the configured token file
    /// is used.
    pub fn build(self) -> ClientResult<TokenStore> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .cookie_store(true)
                .timeout(self.request_timeout)
                .connect_timeout(self.connect_timeout)
                .build()?,
        };

        let durable = match (self.durable, self.persistence) {
            (Some(store), _) => Some(store),
            (None, PersistenceMode::MemoryAndDurable) => {
                Some(Arc::new(FileKeyValueStore::new(self.storage_path)) as Arc<dyn KeyValueStore>)
            }
            (None, PersistenceMode::MemoryOnly) => None,
        };

        Ok(TokenStore {
            inner: Arc::new(Inner {
                http,
                refresh_url: self.refresh_url,
                request_timeout: self.request_timeout,
                default_expires_in: self.default_expires_in,
                persistence: self.persistence,
                durable,
                clock: self.clock,
                cookies: self.cookies,
                state: Mutex::new(TokenState::default()),
                in_flight: Mutex::new(None),
                storage_failures: AtomicU64::new(0),
            }),
        })
    }
}

impl std::fmt::Debug for TokenStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStoreBuilder")
            .field("refresh_url", &self.refresh_url)
            .field("persistence", &self.persistence)
            .finish()
    }
}
