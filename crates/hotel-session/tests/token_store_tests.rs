//! Token store behavior tests.
//!
//! The refresh endpoint is mocked with wiremock; expiry is driven by a
//! manual clock so no test waits on wall time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hotel_session::storage::{ACCESS_TOKEN_EXPIRY_KEY, ACCESS_TOKEN_KEY};
use hotel_session::{
    Clock, Config, DisabledKeyValueStore, KeyValueStore, ManualClock, MemoryKeyValueStore,
    PersistenceMode, RefreshCookieClearer, RefreshError, TokenStore,
};

fn store_for(base_url: &str, clock: &Arc<ManualClock>) -> TokenStore {
    TokenStore::builder(&Config::for_testing(base_url))
        .clock(Arc::clone(clock) as Arc<dyn Clock>)
        .build()
        .unwrap()
}

fn durable_store(clock: &Arc<ManualClock>, durable: &Arc<MemoryKeyValueStore>) -> TokenStore {
    TokenStore::builder(&Config::for_testing("http://127.0.0.1:9"))
        .persistence(PersistenceMode::MemoryAndDurable)
        .durable_store(Arc::clone(durable) as Arc<dyn KeyValueStore>)
        .clock(Arc::clone(clock) as Arc<dyn Clock>)
        .build()
        .unwrap()
}

async fn mount_refresh(server: &MockServer, template: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

async fn refresh_hits(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/auth/refresh")
        .count()
}

#[derive(Default)]
struct CountingClearer(AtomicUsize);

impl RefreshCookieClearer for CountingClearer {
    fn clear_refresh_cookie(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Single-flight refresh
// =============================================================================

#[tokio::test]
async fn test_concurrent_refreshes_share_one_request() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "xyz", "expiresIn": 300}))
            .set_delay(Duration::from_millis(200)),
        1,
    )
    .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    let results = join_all((0..8).map(|_| {
        let store = store.clone();
        async move { store.refresh_access_token().await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap(), "xyz");
    }
    assert_eq!(refresh_hits(&server).await, 1);
    assert_eq!(store.get_access_token().as_deref(), Some("xyz"));
    assert!(!store.is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_single_flight_across_worker_threads() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "xyz", "expiresIn": 300}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.refresh_access_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "xyz");
    }
    assert_eq!(refresh_hits(&server).await, 1);
}

#[tokio::test]
async fn test_concurrent_refresh_failure_is_shared_and_released() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(500).set_delay(Duration::from_millis(200)),
        2,
    )
    .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    let results = join_all((0..5).map(|_| {
        let store = store.clone();
        async move { store.refresh_access_token().await }
    }))
    .await;

    let first = results[0].clone().unwrap_err();
    assert!(matches!(first, RefreshError::Status { status: 500, .. }));
    for result in &results {
        assert_eq!(result.as_ref().unwrap_err(), &first);
    }
    assert_eq!(refresh_hits(&server).await, 1);

    // The marker was released, so the next demand starts a new attempt.
    assert!(!store.is_refreshing());
    assert!(store.refresh_access_token().await.is_err());
    assert_eq!(refresh_hits(&server).await, 2);
}

#[tokio::test]
async fn test_refresh_completes_after_caller_is_cancelled() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "xyz", "expiresIn": 300}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;

    let mut config = Config::for_testing(&server.uri());
    config.request_timeout = Duration::from_secs(1);
    let store = TokenStore::builder(&config)
        .clock(Arc::new(ManualClock::default()) as Arc<dyn Clock>)
        .build()
        .unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), store.refresh_access_token()).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(!store.is_refreshing());
    assert_eq!(store.get_access_token().as_deref(), Some("xyz"));
    assert_eq!(store.get_auth_header().await.as_deref(), Some("Bearer xyz"));
    assert_eq!(refresh_hits(&server).await, 1);
}

#[tokio::test]
async fn test_joined_caller_survives_cancelled_starter() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "xyz", "expiresIn": 300}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    let starter = tokio::spawn({
        let store = store.clone();
        async move { store.refresh_access_token().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.is_refreshing());
    starter.abort();

    assert_eq!(store.refresh_access_token().await.unwrap(), "xyz");
    assert_eq!(refresh_hits(&server).await, 1);
}

#[tokio::test]
async fn test_concurrent_auth_headers_share_one_refresh() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "xyz", "expiresIn": 300}))
            .set_delay(Duration::from_millis(100)),
        1,
    )
    .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    let (a, b) = tokio::join!(store.get_auth_header(), store.get_auth_header());

    assert_eq!(a.as_deref(), Some("Bearer xyz"));
    assert_eq!(b.as_deref(), Some("Bearer xyz"));
    assert_eq!(refresh_hits(&server).await, 1);
}

// =============================================================================
// Refresh outcomes
// =============================================================================

#[tokio::test]
async fn test_refresh_server_error_clears_session() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(500), 1).await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));
    store.set_access_token("old", 600);

    let err = store.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, RefreshError::Status { status: 500, .. }));
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn test_refresh_without_token_field_fails() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(json!({"expiresIn": 300})), 1)
        .await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    assert_eq!(store.refresh_access_token().await, Err(RefreshError::MissingToken));
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn test_refresh_with_invalid_body_fails() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_string("<html>oops</html>"), 1).await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));

    assert!(matches!(store.refresh_access_token().await, Err(RefreshError::InvalidBody(_))));
}

#[tokio::test]
async fn test_refresh_defaults_expiry_to_600_seconds() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(json!({"accessToken": "xyz"})), 1)
        .await;

    let clock = Arc::new(ManualClock::default());
    let store = store_for(&server.uri(), &clock);
    store.refresh_access_token().await.unwrap();

    clock.advance(Duration::from_secs(599));
    assert!(store.is_authenticated());

    clock.advance(Duration::from_secs(1));
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn test_refresh_timeout_is_a_failure() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"accessToken": "late"}))
            .set_delay(Duration::from_secs(3)),
        1,
    )
    .await;

    let mut config = Config::for_testing(&server.uri());
    config.request_timeout = Duration::from_millis(300);
    let store = TokenStore::builder(&config).build().unwrap();

    assert!(matches!(store.refresh_access_token().await, Err(RefreshError::Timeout(_))));
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn test_refresh_unreachable_endpoint_fails() {
    let store = store_for("http://127.0.0.1:9", &Arc::new(ManualClock::default()));
    assert!(store.refresh_access_token().await.is_err());
    assert!(store.get_auth_header().await.is_none());
}

#[tokio::test]
async fn test_auth_header_uses_cached_token_without_network() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let store = store_for(&server.uri(), &Arc::new(ManualClock::default()));
    store.set_access_token("cached", 600);

    assert_eq!(store.get_auth_header().await.as_deref(), Some("Bearer cached"));
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn test_expiry_is_monotonic() {
    let clock = Arc::new(ManualClock::default());
    let store = store_for("http://127.0.0.1:9", &clock);

    store.set_access_token("t", 600);
    assert!(!store.is_token_expired());

    clock.advance(Duration::from_millis(599_999));
    assert!(!store.is_token_expired());
    assert_eq!(store.get_access_token().as_deref(), Some("t"));

    clock.advance(Duration::from_millis(1));
    assert!(store.is_token_expired());
    assert!(store.get_access_token().is_none());
}

#[test]
fn test_one_second_token_gone_after_1100ms() {
    let clock = Arc::new(ManualClock::default());
    let store = store_for("http://127.0.0.1:9", &clock);

    store.set_access_token("abc", 1);
    clock.advance(Duration::from_millis(1_100));

    assert!(store.get_access_token().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timer_clears_token_without_getter() {
    // The manual clock never moves: only the timer can drop the token.
    let store = store_for("http://127.0.0.1:9", &Arc::new(ManualClock::default()));

    store.set_access_token("abc", 1);
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(store.get_access_token().as_deref(), Some("abc"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.get_access_token().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_does_not_clear_newer_token() {
    let store = store_for("http://127.0.0.1:9", &Arc::new(ManualClock::default()));

    store.set_access_token("first", 1);
    store.set_access_token("second", 10);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(store.get_access_token().as_deref(), Some("second"));

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(store.get_access_token().is_none());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_persisted_token_survives_restart() {
    let clock = Arc::new(ManualClock::default());
    let durable = Arc::new(MemoryKeyValueStore::new());

    let first = durable_store(&clock, &durable);
    first.set_access_token("t", 600);
    drop(first);

    clock.advance(Duration::from_secs(300));
    let second = durable_store(&clock, &durable);
    assert_eq!(second.get_access_token().as_deref(), Some("t"));
    assert!(!second.is_token_expired());
}

#[test]
fn test_persisted_token_past_expiry_is_cleaned_up() {
    let clock = Arc::new(ManualClock::default());
    let durable = Arc::new(MemoryKeyValueStore::new());

    let first = durable_store(&clock, &durable);
    first.set_access_token("t", 600);
    drop(first);

    clock.advance(Duration::from_secs(601));
    let second = durable_store(&clock, &durable);
    assert!(second.get_access_token().is_none());
    assert!(durable.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(durable.get(ACCESS_TOKEN_EXPIRY_KEY).unwrap().is_none());
}

#[test]
fn test_persisted_expiry_is_absolute_millis() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let durable = Arc::new(MemoryKeyValueStore::new());

    durable_store(&clock, &durable).set_access_token("t", 600);

    assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("t"));
    assert_eq!(durable.get(ACCESS_TOKEN_EXPIRY_KEY).unwrap().as_deref(), Some("1600000"));
}

#[test]
fn test_malformed_durable_expiry_is_discarded() {
    let clock = Arc::new(ManualClock::default());
    let durable = Arc::new(MemoryKeyValueStore::new());
    durable.set(ACCESS_TOKEN_KEY, "t").unwrap();
    durable.set(ACCESS_TOKEN_EXPIRY_KEY, "tomorrow").unwrap();

    let store = durable_store(&clock, &durable);
    assert!(store.get_access_token().is_none());
    assert!(durable.is_empty());
}

#[test]
fn test_storage_failures_are_swallowed() {
    let clock = Arc::new(ManualClock::default());
    let store = TokenStore::builder(&Config::for_testing("http://127.0.0.1:9"))
        .persistence(PersistenceMode::MemoryAndDurable)
        .durable_store(Arc::new(DisabledKeyValueStore))
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .unwrap();

    store.set_access_token("abc", 600);
    assert_eq!(store.get_access_token().as_deref(), Some("abc"));
    assert!(store.storage_failures() >= 1);

    let before = store.storage_failures();
    store.clear_all_tokens();
    assert!(!store.is_authenticated());
    assert!(store.storage_failures() > before);
}

// =============================================================================
// Clearing
// =============================================================================

#[test]
fn test_clear_all_tokens_is_idempotent() {
    let clock = Arc::new(ManualClock::default());
    let durable = Arc::new(MemoryKeyValueStore::new());
    let clearer = Arc::new(CountingClearer::default());
    let store = TokenStore::builder(&Config::for_testing("http://127.0.0.1:9"))
        .persistence(PersistenceMode::MemoryAndDurable)
        .durable_store(Arc::clone(&durable) as Arc<dyn KeyValueStore>)
        .cookie_clearer(Arc::clone(&clearer) as Arc<dyn RefreshCookieClearer>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .unwrap();

    store.set_access_token("abc", 600);

    store.clear_all_tokens();
    assert!(!store.is_authenticated());
    assert!(durable.is_empty());

    store.clear_all_tokens();
    assert!(!store.is_authenticated());
    assert_eq!(clearer.0.load(Ordering::SeqCst), 2);
}
