//! Subscribers shipped with the client.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::event_bus::EventSubscriber;
use super::events::{Event, EventKind};
use crate::error::Result;

/// Writes every event to `tracing`. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSubscriber;

impl EventSubscriber for LoggingSubscriber {
    fn handles(&self, _kind: EventKind) -> bool {
        true
    }

    fn handle(&self, event: &Event) -> Result<()> {
        match event {
            Event::Authenticated { client_id, .. } => {
                tracing::info!(client_id = %client_id, "Authenticated");
            }
            Event::Fetched { snapshot, .. } => {
                tracing::info!(
                    features = snapshot.features.len(),
                    releases = snapshot.releases.len(),
                    "Fetched flags"
                );
            }
            Event::Evaluated {
                feature,
                result,
                value,
                ..
            } => {
                tracing::debug!(feature = %feature, result = ?result, value, "Evaluated feature");
            }
            Event::Error {
                code,
                status,
                message,
                ..
            } => {
                tracing::warn!(code = %code, status = ?status, "{}", message);
            }
            Event::Ready { .. } => {
                tracing::info!("Client ready");
            }
            Event::MetricsPublished { evaluations, .. } => {
                tracing::debug!(evaluations, "Metrics published");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Counters for one feature.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMetrics {
    pub evaluations: u64,
    pub enabled: u64,
    /// Evaluations answered with the caller's default.
    pub defaulted: u64,
}

/// Per-feature evaluation counters fed by `Evaluated` events.
#[derive(Debug, Default)]
pub struct EvaluationMetrics {
    counters: Mutex<HashMap<String, FeatureMetrics>>,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, FeatureMetrics> {
        self.counters.lock().clone()
    }

    pub fn total_evaluations(&self) -> u64 {
        self.counters.lock().values().map(|m| m.evaluations).sum()
    }

    /// Return the counters and reset them.
    pub fn take(&self) -> HashMap<String, FeatureMetrics> {
        std::mem::take(&mut *self.counters.lock())
    }
}

impl EventSubscriber for EvaluationMetrics {
    fn handles(&self, kind: EventKind) -> bool {
        kind == EventKind::Evaluated
    }

    fn handle(&self, event: &Event) -> Result<()> {
        if let Event::Evaluated {
            feature,
            result,
            value,
            ..
        } = event
        {
            let mut counters = self.counters.lock();
            let metrics = counters.entry(feature.clone()).or_default();
            metrics.evaluations += 1;
            if *value {
                metrics.enabled += 1;
            }
            if result.is_none() {
                metrics.defaulted += 1;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "evaluation-metrics"
    }
}

/// Adapts a closure into a subscriber for a fixed set of event kinds.
pub struct FnSubscriber<F> {
    kinds: Vec<EventKind>,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(kinds: impl IntoIterator<Item = EventKind>, handler: F) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            handler,
        }
    }

    pub fn all(handler: F) -> Self {
        Self::new(EventKind::ALL, handler)
    }
}

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    fn handles(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn handle(&self, event: &Event) -> Result<()> {
        (self.handler)(event)
    }
}
