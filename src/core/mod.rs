mod cache;
mod config;
mod event_bus;
mod events;
mod refresh;
mod subscribers;

pub use cache::{Cache, CacheEntry};
pub use config::{
    TogglesConfig, TogglesConfigBuilder, DEFAULT_BASE_URL, DEFAULT_CACHE_TTL,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_POLL_INTERVAL, DEFAULT_MAX_CACHE_SIZE,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_STAGE, DEFAULT_TIMEOUT,
};
pub use event_bus::{
    BusState, DeadLetter, EventBus, EventBusConfig, EventBusConfigBuilder, EventSubscriber,
    FailurePolicy, SubscriptionId, DEFAULT_POLL_INTERVAL,
};
pub use events::{Event, EventKind};
pub use refresh::{RefreshCoordinator, SnapshotSource};
pub use subscribers::{EvaluationMetrics, FeatureMetrics, FnSubscriber, LoggingSubscriber};
