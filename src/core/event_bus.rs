//! In-process publish/subscribe for engine events.
//!
//! Publishing appends to a queue and wakes a single background dispatch loop.
//! The loop takes events in publish order and hands each one to every
//! interested subscriber on its own blocking task, without waiting for the
//! handlers to finish. A handler failure is dealt with according to the
//! configured [`FailurePolicy`].

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::events::{Event, EventKind};
use crate::error::{ErrorCode, Result, TogglesError};

/// Default idle wake-up interval for the dispatch loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What happens to an event when a subscriber fails to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Put the event back at the end of the queue for every interested
    /// subscriber. There is no limit and no backoff: a subscriber that always
    /// fails keeps the event circulating until shutdown.
    #[default]
    Redeliver,

    /// Log the failure and drop the event.
    Discard,

    /// Redeliver until the event has been delivered `max_attempts` times,
    /// then park it in the dead-letter list.
    DeadLetter { max_attempts: u32 },
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Longest time the loop sleeps with an empty queue. Default: 1 second
    pub poll_interval: Duration,

    /// Handling of subscriber failures. Default: redeliver
    pub failure_policy: FailurePolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl EventBusConfig {
    pub fn builder() -> EventBusConfigBuilder {
        EventBusConfigBuilder::default()
    }
}

/// Builder for EventBusConfig.
#[derive(Debug, Default)]
pub struct EventBusConfigBuilder {
    poll_interval: Option<Duration>,
    failure_policy: Option<FailurePolicy>,
}

impl EventBusConfigBuilder {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn build(self) -> EventBusConfig {
        EventBusConfig {
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            failure_policy: self.failure_policy.unwrap_or_default(),
        }
    }
}

/// A consumer of engine events.
///
/// `handle` runs on a blocking worker, so it may do synchronous I/O. Returning
/// an error (or panicking) counts as a failed delivery.
pub trait EventSubscriber: Send + Sync + 'static {
    /// Whether events of `kind` should be delivered to this subscriber.
    fn handles(&self, kind: EventKind) -> bool;

    fn handle(&self, event: &Event) -> Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Waiting for a publish or the poll interval.
    Idle,
    Draining,
    ShuttingDown,
    Stopped,
}

impl BusState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BusState::Idle,
            1 => BusState::Draining,
            2 => BusState::ShuttingDown,
            _ => BusState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            BusState::Idle => 0,
            BusState::Draining => 1,
            BusState::ShuttingDown => 2,
            BusState::Stopped => 3,
        }
    }
}

/// An event that exhausted its delivery budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: Arc<Event>,
    pub deliveries: u32,
    pub subscriber: String,
    pub error: String,
}

struct Envelope {
    event: Arc<Event>,
    deliveries: u32,
}

type SubscriberList = Arc<[Arc<dyn EventSubscriber>]>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>,
    // Rebuilt lazily per kind; cleared whenever `subscribers` changes.
    by_kind: HashMap<EventKind, SubscriberList>,
}

impl Registry {
    fn clear(&mut self) {
        self.subscribers.clear();
        self.by_kind.clear();
    }
}

struct Shared {
    config: EventBusConfig,
    queue: Mutex<VecDeque<Envelope>>,
    registry: Mutex<Registry>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    wake: Notify,
    shutting_down: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    /// Move between the loop's running states. Never leaves `ShuttingDown`
    /// or `Stopped`, even when shutdown is signalled concurrently.
    fn set_state(&self, state: BusState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                matches!(
                    BusState::from_u8(current),
                    BusState::Idle | BusState::Draining
                )
                .then_some(state.as_u8())
            });
    }

    fn enqueue(&self, envelope: Envelope) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::trace!(kind = %envelope.event.kind(), "Event bus shut down, dropping event");
            return false;
        }

        self.queue.lock().push_back(envelope);
        self.wake.notify_one();
        true
    }

    fn subscribers_for(&self, kind: EventKind) -> SubscriberList {
        let mut registry = self.registry.lock();

        if let Some(list) = registry.by_kind.get(&kind) {
            return Arc::clone(list);
        }

        let list: SubscriberList = registry
            .subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.handles(kind))
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        registry.by_kind.insert(kind, Arc::clone(&list));
        list
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        let kind = envelope.event.kind();
        let subscribers = self.subscribers_for(kind);

        if subscribers.is_empty() {
            tracing::trace!(%kind, "No subscribers for event");
            return;
        }

        for subscriber in subscribers.iter() {
            let subscriber = Arc::clone(subscriber);
            let shared = Arc::clone(self);
            let event = Arc::clone(&envelope.event);
            let deliveries = envelope.deliveries;

            tokio::task::spawn_blocking(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.handle(&event)))
                    .unwrap_or_else(|_| {
                        Err(TogglesError::new(
                            ErrorCode::EventHandlerPanicked,
                            "Subscriber panicked while handling event",
                        ))
                    });

                if let Err(error) = outcome {
                    shared.on_failure(event, deliveries, subscriber.name(), &error);
                }
            });
        }
    }

    fn on_failure(&self, event: Arc<Event>, deliveries: u32, subscriber: &str, error: &TogglesError) {
        let kind = event.kind();

        match self.config.failure_policy {
            FailurePolicy::Discard => {
                tracing::warn!(%kind, subscriber, %error, "Event handler failed, discarding event");
            }
            FailurePolicy::Redeliver => {
                tracing::warn!(%kind, subscriber, %error, deliveries, "Event handler failed, re-publishing event");
                self.enqueue(Envelope {
                    event,
                    deliveries: deliveries.saturating_add(1),
                });
            }
            FailurePolicy::DeadLetter { max_attempts } => {
                if deliveries >= max_attempts {
                    tracing::warn!(%kind, subscriber, %error, deliveries, "Event handler failed, dead-lettering event");
                    self.dead_letters.lock().push(DeadLetter {
                        event,
                        deliveries,
                        subscriber: subscriber.to_string(),
                        error: error.to_string(),
                    });
                } else {
                    tracing::warn!(%kind, subscriber, %error, deliveries, "Event handler failed, re-publishing event");
                    self.enqueue(Envelope {
                        event,
                        deliveries: deliveries.saturating_add(1),
                    });
                }
            }
        }
    }

    fn stop(&self) -> usize {
        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.registry.lock().clear();
        self.state.store(BusState::Stopped.as_u8(), Ordering::SeqCst);
        dropped
    }
}

async fn run(shared: Arc<Shared>) {
    tracing::debug!("Event bus dispatch loop started");

    while !shared.shutting_down.load(Ordering::SeqCst) {
        let next = shared.queue.lock().pop_front();

        match next {
            Some(envelope) => {
                shared.set_state(BusState::Draining);
                shared.dispatch(envelope);
                tokio::task::yield_now().await;
            }
            None => {
                shared.set_state(BusState::Idle);
                // The timeout only lets the loop re-check the shutdown flag.
                let _ = tokio::time::timeout(shared.config.poll_interval, shared.wake.notified())
                    .await;
            }
        }
    }

    let dropped = shared.stop();
    tracing::debug!(dropped, "Event bus dispatch loop stopped");
}

/// Cheaply cloneable handle to one event bus.
///
/// Every clone refers to the same queue, subscribers and dispatch loop.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(VecDeque::new()),
                registry: Mutex::new(Registry::default()),
                dead_letters: Mutex::new(Vec::new()),
                wake: Notify::new(),
                shutting_down: AtomicBool::new(false),
                state: AtomicU8::new(BusState::Idle.as_u8()),
            }),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EventBusConfig::default())
    }

    /// Spawn the dispatch loop on the current tokio runtime.
    ///
    /// Calling this on a running bus is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(TogglesError::new(
                ErrorCode::InitFailed,
                "Event bus has been shut down",
            ));
        }

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|e| {
            TogglesError::with_source(
                ErrorCode::NoRuntime,
                "Event bus must be started from within a tokio runtime",
                e,
            )
        })?;

        *worker = Some(handle.spawn(run(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Queue an event for delivery. Never blocks; events published after
    /// shutdown are dropped.
    pub fn publish(&self, event: Event) {
        self.shared.enqueue(Envelope {
            event: Arc::new(event),
            deliveries: 1,
        });
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let mut registry = self.shared.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscribers.push((id, subscriber));
        registry.by_kind.clear();
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.shared.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(existing, _)| *existing != id);

        if registry.subscribers.len() == before {
            return false;
        }

        registry.by_kind.clear();
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().subscribers.len()
    }

    /// Number of events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn state(&self) -> BusState {
        BusState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some() && !self.shared.shutting_down.load(Ordering::SeqCst)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.lock().clone()
    }

    /// Ask the dispatch loop to stop without waiting for it.
    ///
    /// Queued events are dropped and all subscriptions are cleared.
    pub fn signal_shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared
            .state
            .store(BusState::ShuttingDown.as_u8(), Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Stop the dispatch loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.signal_shutdown();

        let worker = self.worker.lock().take();
        match worker {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::warn!("Event bus dispatch loop ended abnormally: {}", e);
                    self.shared.stop();
                }
            }
            None => {
                self.shared.stop();
            }
        }
    }
}
