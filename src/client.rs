use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{
    EvaluationMetrics, Event, EventBus, EventBusConfig, EventSubscriber, FeatureMetrics,
    LoggingSubscriber, RefreshCoordinator, SubscriptionId, TogglesConfig,
};
use crate::error::Result;
use crate::http::{CredentialProvider, HttpClient, RemoteFlagFetcher};
use crate::types::FlagSnapshot;

/// Client name and crate version, as reported by [`TogglesClient::version`].
pub const CLIENT_VERSION: &str = concat!("toggles-client-rust:", env!("CARGO_PKG_VERSION"));

/// Answers feature checks from a cached snapshot that is refreshed in the
/// background of the calling task once it goes stale.
///
/// Feature checks never fail: when no snapshot can be obtained the caller's
/// default is returned, and when a refresh fails the last snapshot that was
/// fetched successfully keeps being served.
pub struct TogglesClient {
    config: TogglesConfig,
    credentials: Arc<CredentialProvider>,
    coordinator: RefreshCoordinator<RemoteFlagFetcher>,
    bus: EventBus,
    metrics: Arc<EvaluationMetrics>,
    created_at: DateTime<Utc>,
    ready: AtomicBool,
}

impl TogglesClient {
    /// Build a client and start its event bus.
    ///
    /// Must be called from within a tokio runtime. No network traffic happens
    /// until [`initialize`](Self::initialize) or the first feature check.
    pub fn new(config: TogglesConfig) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new(
            EventBusConfig::builder()
                .poll_interval(config.event_poll_interval)
                .failure_policy(config.failure_policy)
                .build(),
        );
        bus.start()?;

        let http = HttpClient::new(&config)?;
        let credentials = Arc::new(CredentialProvider::new(http.clone(), &config));
        let fetcher = RemoteFlagFetcher::new(http, &config, Arc::clone(&credentials), bus.clone());
        let coordinator = RefreshCoordinator::new(fetcher, config.cache_ttl, config.max_cache_size);

        let metrics = Arc::new(EvaluationMetrics::new());
        bus.subscribe(Arc::new(LoggingSubscriber));
        bus.subscribe(Arc::clone(&metrics) as Arc<dyn EventSubscriber>);

        tracing::debug!(
            instance_id = %config.instance_id,
            stage = %config.stage,
            "Toggles client created"
        );

        Ok(Self {
            config,
            credentials,
            coordinator,
            bus,
            metrics,
            created_at: Utc::now(),
            ready: AtomicBool::new(false),
        })
    }

    /// Fetch the first snapshot (when `fetch_on_startup` is set) and publish
    /// `Ready`.
    ///
    /// A failed startup fetch is returned to the caller; the client stays
    /// usable and retries on the next feature check.
    pub async fn initialize(&self) -> Result<()> {
        if self.config.fetch_on_startup {
            self.coordinator.get_current(self.cache_key()).await?;
        }

        self.ready.store(true, Ordering::SeqCst);
        self.bus.publish(Event::ready());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether `feature` is enabled, or `default` if it is unknown or no
    /// snapshot is available. Publishes an `Evaluated` event.
    pub async fn is_enabled(&self, feature: &str, default: bool) -> bool {
        let result = self.evaluate(feature).await;
        let value = result.unwrap_or(default);

        self.bus.publish(Event::evaluated(feature, result, value));
        value
    }

    /// Raw evaluation: `None` when the feature is unknown or no snapshot is
    /// available. Publishes nothing.
    pub async fn evaluate(&self, feature: &str) -> Option<bool> {
        self.snapshot()
            .await
            .and_then(|snapshot| snapshot.is_enabled(feature))
    }

    /// Whether the current snapshot knows `feature` at all.
    pub async fn has_feature(&self, feature: &str) -> bool {
        self.snapshot()
            .await
            .map(|snapshot| snapshot.has_feature(feature))
            .unwrap_or(false)
    }

    /// The snapshot feature checks are answered from right now, refreshing it
    /// first if stale. Falls back to the last fetched snapshot on failure.
    pub async fn snapshot(&self) -> Option<Arc<FlagSnapshot>> {
        let key = self.cache_key();

        match self.coordinator.get_current(key).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => self.coordinator.last_known(key),
            Err(e) => {
                tracing::debug!(code = %e.code, "Refresh failed, serving last known snapshot");
                self.coordinator.last_known(key)
            }
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Per-feature evaluation counters collected so far.
    pub fn metrics(&self) -> HashMap<String, FeatureMetrics> {
        self.metrics.snapshot()
    }

    /// Reset the evaluation counters and publish `MetricsPublished` with the
    /// number of evaluations they covered.
    pub fn flush_metrics(&self) -> HashMap<String, FeatureMetrics> {
        let counters = self.metrics.take();
        let evaluations = counters.values().map(|m| m.evaluations).sum();

        self.bus.publish(Event::metrics_published(evaluations));
        counters
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &TogglesConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        self.credentials.client_id()
    }

    pub fn stage(&self) -> &str {
        &self.config.stage
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    pub fn version(&self) -> &'static str {
        CLIENT_VERSION
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Stop the event bus. Pending events are dropped.
    pub async fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.bus.shutdown().await;
        tracing::debug!(instance_id = %self.config.instance_id, "Toggles client closed");
    }

    // One snapshot per client identity.
    fn cache_key(&self) -> &str {
        self.credentials.client_id()
    }
}

impl Drop for TogglesClient {
    fn drop(&mut self) {
        self.bus.signal_shutdown();
    }
}
