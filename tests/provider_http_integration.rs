//! Integration tests for the HTTP provider client
//!
//! Runs real requests against a wiremock server, both directly and
//! through the orchestrator.

use ip_widget::{
    build_http_client, CountryCode, FieldMap, HttpProviderClient, OrchestratorConfig,
    ProviderClient, ProviderDescriptor, ProviderRegistry, RefreshOrchestrator, ResolutionState,
    RetryPolicy, ShutdownController, Trigger,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        backoff_base: Duration::from_millis(10),
        jitter: false,
        deadline: Duration::from_secs(5),
    }
}

fn free_ip_api_at(server: &MockServer) -> ProviderDescriptor {
    ProviderDescriptor::new(
        "FreeIPAPI",
        format!("{}/api/json/", server.uri()),
        FieldMap::new("ipAddress", "countryCode"),
    )
}

fn client_for(descriptor: ProviderDescriptor, policy: RetryPolicy) -> HttpProviderClient {
    let client = build_http_client(&policy).unwrap();
    HttpProviderClient::new(descriptor, client, policy)
}

fn us_body() -> serde_json::Value {
    json!({ "ipVersion": 4, "ipAddress": "203.0.113.5", "countryCode": "US", "countryName": "United States" })
}

async fn wait_for_len(published: &Mutex<Vec<ResolutionState>>, len: usize) -> bool {
    for _ in 0..400 {
        if published.lock().len() >= len {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_resolve_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(us_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(free_ip_api_at(&server), fast_policy());
    let result = client.resolve().await;

    assert!(result.success);
    assert_eq!(result.ip_address.as_deref(), Some("203.0.113.5"));
    assert_eq!(result.country_code, CountryCode::parse("US"));
}

#[tokio::test]
async fn test_resolve_uses_field_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "2001:db8::1",
            "country_code": "de",
            "is_proxy": false
        })))
        .mount(&server)
        .await;

    let descriptor = ProviderDescriptor::new(
        "IP2Location",
        format!("{}/", server.uri()),
        FieldMap::new("ip", "country_code"),
    );
    let result = client_for(descriptor, fast_policy()).resolve().await;

    assert!(result.success);
    assert_eq!(result.ip_address.as_deref(), Some("2001:db8::1"));
    assert_eq!(result.country_code, CountryCode::parse("DE"));
}

#[tokio::test]
async fn test_malformed_body_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ipAddress": "203.0.113.5" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(free_ip_api_at(&server), fast_policy())
        .resolve()
        .await;

    assert!(!result.success);
    assert!(result.ip_address.is_none());
    assert!(result.country_code.is_none());
}

#[tokio::test]
async fn test_non_json_body_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let result = client_for(free_ip_api_at(&server), fast_policy())
        .resolve()
        .await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(free_ip_api_at(&server), fast_policy())
        .resolve()
        .await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let result = client_for(free_ip_api_at(&server), fast_policy())
        .resolve()
        .await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_deadline_caps_total_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(us_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        deadline: Duration::from_millis(300),
        ..fast_policy()
    };
    let started = Instant::now();
    let result = client_for(free_ip_api_at(&server), policy).resolve().await;

    assert!(!result.success);
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Scenario A: startup against a healthy provider publishes once
#[tokio::test]
async fn test_startup_resolution_through_orchestrator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(us_body()))
        .expect(1)
        .mount(&server)
        .await;

    let policy = fast_policy();
    let registry = Arc::new(ProviderRegistry::new(HttpProviderClient::factory(
        build_http_client(&policy).unwrap(),
        policy,
    )));
    registry.register(free_ip_api_at(&server)).unwrap();

    let shutdown = ShutdownController::new();
    let orchestrator =
        RefreshOrchestrator::new(registry, OrchestratorConfig::default(), shutdown.clone());
    let handle = orchestrator.handle();
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    handle.subscribe(move |state: &ResolutionState| sink.lock().push(state.clone()));
    let task = orchestrator.spawn();

    handle.trigger(Trigger::Startup);
    assert!(wait_for_len(&published, 1).await);

    let state = published.lock()[0].clone();
    assert!(state.current.success);
    assert_eq!(state.current.ip_address.as_deref(), Some("203.0.113.5"));
    assert_eq!(state.icon_key(), "us");
    assert_eq!(state.active_provider_name, "FreeIPAPI");

    handle.shutdown();
    task.await.unwrap();
}

/// Scenario B: transient 503s are retried inside one resolution
#[tokio::test]
async fn test_transient_failures_recover_within_one_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ipAddress": "198.51.100.7",
            "countryCode": "DE"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let policy = fast_policy();
    let registry = Arc::new(ProviderRegistry::new(HttpProviderClient::factory(
        build_http_client(&policy).unwrap(),
        policy,
    )));
    registry.register(free_ip_api_at(&server)).unwrap();

    let orchestrator = RefreshOrchestrator::new(
        registry,
        OrchestratorConfig::default(),
        ShutdownController::new(),
    );
    let handle = orchestrator.handle();
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    handle.subscribe(move |state: &ResolutionState| sink.lock().push(state.clone()));
    let task = orchestrator.spawn();

    handle.trigger_manual_refresh();
    assert!(wait_for_len(&published, 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let published = published.lock().clone();
    assert_eq!(published.len(), 1);
    assert!(published[0].current.success);
    assert_eq!(published[0].current.country_code, CountryCode::parse("DE"));
    assert_eq!(published[0].consecutive_failures, 0);
    assert_eq!(handle.resolutions_started(), 1);

    handle.shutdown();
    task.await.unwrap();
}
