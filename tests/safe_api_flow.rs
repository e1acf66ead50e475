//! End-to-end flow through the guarded client with a faked transport and a
//! real on-disk state/cache store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use affiliget::api::{ApiError, SafeApiClient};
use affiliget::clock::{Clock, ManualClock};
use affiliget::config::{CoupangCredentials, Settings};
use affiliget::errorlog::ErrorLog;
use affiliget::models::Platform;
use affiliget::providers::{self, ApiRequest, ApiResponse, Transport, TransportError};
use affiliget::store::{FileStore, StateStore};

/// Serves canned responses in order; panics if the queue runs dry.
struct FakeTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(responses: Vec<ApiResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, _request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no canned response left");
        Ok(response)
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.coupang = Some(CoupangCredentials {
        access_key: "test-access".to_string(),
        secret_key: "test-secret".to_string(),
        sub_id: None,
    });
    settings
}

fn search_body() -> String {
    r#"{
        "rCode": "0",
        "rMessage": "",
        "data": {
            "productData": [
                {
                    "productName": "USB-C Hub",
                    "productPrice": 25900,
                    "productImage": "https://img.coupang.com/1.jpg",
                    "productUrl": "https://link.coupang.com/a/x"
                }
            ]
        }
    }"#
    .to_string()
}

fn manual_clock() -> Arc<ManualClock> {
    let start = chrono::DateTime::parse_from_rfc3339("2024-05-17T08:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    Arc::new(ManualClock::new(start))
}

fn build_client(
    transport: Arc<FakeTransport>,
    state_dir: &std::path::Path,
    cache_dir: &std::path::Path,
    clock: Arc<ManualClock>,
) -> SafeApiClient {
    let settings = test_settings();
    let state: Arc<dyn StateStore> = Arc::new(FileStore::open(state_dir).unwrap());
    let cache: Arc<dyn StateStore> = Arc::new(FileStore::open(cache_dir).unwrap());
    let clock: Arc<dyn Clock> = clock;
    let provider =
        providers::client_for(Platform::Coupang, &settings, transport, clock.clone()).unwrap();
    SafeApiClient::new(provider, &settings, state, cache, clock)
}

#[tokio::test]
async fn test_rate_limit_then_success_then_cache() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let cache_dir = dir.path().join("cache");
    let clock = manual_clock();
    let transport = Arc::new(FakeTransport::new(vec![
        ApiResponse {
            status: 429,
            body: "{}".to_string(),
        },
        ApiResponse {
            status: 200,
            body: search_body(),
        },
    ]));
    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());

    // First call hits the provider and is rate limited.
    match client.search("usb hub", 5).await {
        Err(ApiError::RateLimited {
            attempt,
            retry_after,
        }) => {
            assert_eq!(attempt, 1);
            assert!(retry_after.as_secs() >= 600);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    // The failure is in the error log.
    let errors = {
        let state: Arc<dyn StateStore> = Arc::new(FileStore::open(&state_dir).unwrap());
        let log = ErrorLog::new(
            state,
            clock.clone(),
            affiliget::config::Mode::Development,
            500,
        );
        log.recent(10).await
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "rate_limited");

    // Second call succeeds and comes from the provider.
    let outcome = client.search("usb hub", 5).await.unwrap();
    assert!(!outcome.from_cache);
    assert_eq!(outcome.data.len(), 1);
    assert_eq!(outcome.data[0].title.as_deref(), Some("USB-C Hub"));
    assert_eq!(transport.calls(), 2);

    // Third call is served from cache without touching the transport.
    let outcome = client.search("usb hub", 5).await.unwrap();
    assert!(outcome.from_cache);
    assert_eq!(transport.calls(), 2);

    // Both dispatched calls were recorded against the budget.
    assert_eq!(client.usage_count().await, 2);
}

#[tokio::test]
async fn test_cache_survives_client_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let cache_dir = dir.path().join("cache");
    let clock = manual_clock();
    let transport = Arc::new(FakeTransport::new(vec![ApiResponse {
        status: 200,
        body: search_body(),
    }]));

    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());
    let outcome = client.search("keyboard", 3).await.unwrap();
    assert!(!outcome.from_cache);
    drop(client);

    // A fresh client with an empty memory tier finds the entry on disk.
    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());
    let outcome = client.search("keyboard", 3).await.unwrap();
    assert!(outcome.from_cache);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_deleted_cache_file_is_a_clean_miss() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let cache_dir = dir.path().join("cache");
    let clock = manual_clock();
    let transport = Arc::new(FakeTransport::new(vec![
        ApiResponse {
            status: 200,
            body: search_body(),
        },
        ApiResponse {
            status: 200,
            body: search_body(),
        },
    ]));

    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());
    client.search("monitor", 3).await.unwrap();

    // Wipe the disk tier behind the client's back.
    for entry in std::fs::read_dir(&cache_dir).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    // A fresh client sees a miss and re-fetches without error.
    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());
    let outcome = client.search("monitor", 3).await.unwrap();
    assert!(!outcome.from_cache);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_quota_refusal_never_reaches_the_provider() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let cache_dir = dir.path().join("cache");
    let clock = manual_clock();
    // Enough successes to hit the development threshold of 8.
    let responses = (0..8)
        .map(|_| ApiResponse {
            status: 200,
            body: search_body(),
        })
        .collect();
    let transport = Arc::new(FakeTransport::new(responses));
    let client = build_client(transport.clone(), &state_dir, &cache_dir, clock.clone());

    for i in 0..8 {
        let outcome = client.search(&format!("item {i}"), 3).await.unwrap();
        assert!(!outcome.from_cache);
    }

    match client.search("one too many", 3).await {
        Err(ApiError::QuotaExceeded { count, threshold }) => {
            assert_eq!(count, 8);
            assert_eq!(threshold, 8);
        }
        other => panic!("expected quota refusal, got {other:?}"),
    }
    assert_eq!(transport.calls(), 8);
}
