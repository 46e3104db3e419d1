#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use toggles::{Event, EventKind, EventSubscriber, TogglesConfig, TogglesConfigBuilder};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const FEATURES_PATH: &str = "/stages/development/features";

/// Config pointed at a mock server, with short delays.
pub fn config_for(server: &MockServer) -> TogglesConfigBuilder {
    TogglesConfig::builder(CLIENT_ID, CLIENT_SECRET)
        .base_url(server.uri())
        .retry_delay(Duration::from_millis(5))
        .event_poll_interval(Duration::from_millis(20))
}

pub fn token_body(token: &str) -> serde_json::Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 3600
    })
}

pub async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
        .mount(server)
        .await;
}

pub fn dark_mode_snapshot() -> serde_json::Value {
    json!({
        "stage": { "id": "development" },
        "features": {
            "dark-mode": { "enabled": true },
            "beta-banner": { "enabled": false }
        },
        "releases": {}
    })
}

/// Records every event it sees.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSubscriber for Recorder {
    fn handles(&self, _kind: EventKind) -> bool {
        true
    }

    fn handle(&self, event: &Event) -> toggles::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
