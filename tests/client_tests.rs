mod common;

use common::{config_for, dark_mode_snapshot, mount_token, wait_until, Recorder, CLIENT_ID, CLIENT_SECRET, FEATURES_PATH};
use serde_json::json;
use std::time::Duration;
use toggles::{Event, EventKind, TogglesClient, TogglesConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_features(server: &MockServer, body: serde_json::Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path(FEATURES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_serves_last_known_good_after_failed_refresh() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path(FEATURES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(dark_mode_snapshot()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FEATURES_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(1..)
        .mount(&server)
        .await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_millis(100))
        .build();
    let client = TogglesClient::new(config).unwrap();

    assert!(client.is_enabled("dark-mode", false).await);
    assert!(!client.is_enabled("unknown-flag", false).await);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(client.is_enabled("dark-mode", false).await);
    client.close().await;
}

#[tokio::test]
async fn test_fresh_snapshot_is_not_refetched() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();

    for _ in 0..10 {
        assert!(client.is_enabled("dark-mode", false).await);
    }

    client.close().await;
}

#[tokio::test]
async fn test_unbounded_ttl_fetches_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server).cache_ttl(Duration::MAX).build();
    config.validate().unwrap();
    let client = TogglesClient::new(config).unwrap();

    for _ in 0..5 {
        assert!(client.is_enabled("dark-mode", false).await);
    }

    client.close().await;
}

#[tokio::test]
async fn test_expired_snapshot_is_refetched_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 2).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_millis(80))
        .build();
    let client = TogglesClient::new(config).unwrap();

    assert!(client.is_enabled("dark-mode", false).await);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(client.is_enabled("dark-mode", false).await);
    assert!(client.is_enabled("dark-mode", false).await);

    client.close().await;
}

#[tokio::test]
async fn test_unknown_and_disabled_are_distinguishable() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();

    assert!(!client.is_enabled("beta-banner", false).await);
    assert!(!client.is_enabled("unknown-flag", false).await);

    assert!(client.has_feature("beta-banner").await);
    assert!(!client.has_feature("unknown-flag").await);

    assert_eq!(client.evaluate("beta-banner").await, Some(false));
    assert_eq!(client.evaluate("unknown-flag").await, None);

    // The default only applies to unknown features.
    assert!(!client.is_enabled("beta-banner", true).await);
    assert!(client.is_enabled("unknown-flag", true).await);

    client.close().await;
}

#[tokio::test]
async fn test_release_enables_disabled_feature() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(
        &server,
        json!({
            "features": {
                "gated": { "enabled": false, "release": { "id": "r1" } },
                "held": { "enabled": false, "release": { "id": "r2" } }
            },
            "releases": {
                "r1": { "enabled": true },
                "r2": { "enabled": false }
            }
        }),
        1,
    )
    .await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();

    assert!(client.is_enabled("gated", false).await);
    assert!(!client.is_enabled("held", true).await);

    client.close().await;
}

#[tokio::test]
async fn test_unreachable_service_returns_default() {
    let config = TogglesConfig::builder(CLIENT_ID, CLIENT_SECRET)
        .base_url("http://127.0.0.1:9")
        .build();
    let client = TogglesClient::new(config).unwrap();

    assert!(client.is_enabled("dark-mode", true).await);
    assert!(!client.is_enabled("dark-mode", false).await);
    assert!(client.snapshot().await.is_none());

    client.close().await;
}

#[tokio::test]
async fn test_initialize_fetches_and_publishes_ready() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();
    let recorder = Recorder::new();
    client.subscribe(recorder.clone());

    client.initialize().await.unwrap();
    assert!(client.is_ready());

    assert!(
        wait_until(Duration::from_secs(2), || {
            recorder.count(EventKind::Ready) == 1
                && recorder.count(EventKind::Fetched) == 1
                && recorder.count(EventKind::Authenticated) == 1
        })
        .await
    );

    // Already cached by the startup fetch.
    assert!(client.is_enabled("dark-mode", false).await);
    client.close().await;
}

#[tokio::test]
async fn test_initialize_without_startup_fetch() {
    let server = MockServer::start().await;
    mount_features(&server, dark_mode_snapshot(), 0).await;

    let config = config_for(&server).fetch_on_startup(false).build();
    let client = TogglesClient::new(config).unwrap();

    client.initialize().await.unwrap();
    assert!(client.is_ready());

    client.close().await;
}

#[tokio::test]
async fn test_initialize_reports_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = TogglesClient::new(config_for(&server).build()).unwrap();
    let recorder = Recorder::new();
    client.subscribe(recorder.clone());

    let err = client.initialize().await.unwrap_err();
    assert_eq!(err.status, Some(403));
    assert!(!client.is_ready());

    assert!(wait_until(Duration::from_secs(2), || recorder.count(EventKind::Error) == 1).await);
    assert_eq!(recorder.count(EventKind::Ready), 0);

    client.close().await;
}

#[tokio::test]
async fn test_evaluations_are_published_and_counted() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();
    let recorder = Recorder::new();
    client.subscribe(recorder.clone());

    client.is_enabled("dark-mode", false).await;
    client.is_enabled("dark-mode", false).await;
    client.is_enabled("unknown-flag", true).await;

    assert!(wait_until(Duration::from_secs(2), || recorder.count(EventKind::Evaluated) == 3).await);
    assert!(
        wait_until(Duration::from_secs(2), || {
            client.metrics().values().map(|m| m.evaluations).sum::<u64>() == 3
        })
        .await
    );

    let evaluated: Vec<_> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Evaluated {
                feature,
                result,
                value,
                ..
            } => Some((feature, result, value)),
            _ => None,
        })
        .collect();
    assert!(evaluated.contains(&("unknown-flag".to_string(), None, true)));
    assert!(evaluated.contains(&("dark-mode".to_string(), Some(true), true)));

    let metrics = client.metrics();
    assert_eq!(metrics["dark-mode"].enabled, 2);
    assert_eq!(metrics["unknown-flag"].defaulted, 1);

    let flushed = client.flush_metrics();
    assert_eq!(flushed.len(), 2);
    assert!(client.metrics().is_empty());

    assert!(
        wait_until(Duration::from_secs(2), || {
            recorder.events().iter().any(|e| {
                matches!(e, Event::MetricsPublished { evaluations: 3, .. })
            })
        })
        .await
    );

    client.close().await;
}

#[tokio::test]
async fn test_unsubscribe_through_client() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    mount_features(&server, dark_mode_snapshot(), 1).await;

    let config = config_for(&server)
        .cache_ttl(Duration::from_secs(60))
        .build();
    let client = TogglesClient::new(config).unwrap();
    let recorder = Recorder::new();
    let id = client.subscribe(recorder.clone());

    assert!(client.unsubscribe(id));
    client.is_enabled("dark-mode", false).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorder.events().is_empty());

    client.close().await;
}
