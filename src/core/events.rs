//! Events raised by the engine and consumed through the [`EventBus`](super::EventBus).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{sanitize_message, ErrorCode, TogglesError};
use crate::types::FlagSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Authenticated,
    Fetched,
    Evaluated,
    Error,
    Ready,
    MetricsPublished,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Authenticated,
        EventKind::Fetched,
        EventKind::Evaluated,
        EventKind::Error,
        EventKind::Ready,
        EventKind::MetricsPublished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Authenticated => "authenticated",
            EventKind::Fetched => "fetched",
            EventKind::Evaluated => "evaluated",
            EventKind::Error => "error",
            EventKind::Ready => "ready",
            EventKind::MetricsPublished => "metrics_published",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened inside the engine. Immutable once published.
#[derive(Debug, Clone)]
pub enum Event {
    Authenticated {
        client_id: String,
        authenticated_at: DateTime<Utc>,
    },
    Fetched {
        snapshot: Arc<FlagSnapshot>,
        fetched_at: DateTime<Utc>,
    },
    Evaluated {
        feature: String,
        /// What the snapshot said, `None` when the feature was unknown or no
        /// snapshot was available.
        result: Option<bool>,
        /// What the caller got back, after applying its default.
        value: bool,
        evaluated_at: DateTime<Utc>,
    },
    Error {
        code: ErrorCode,
        status: Option<u16>,
        message: String,
        occurred_at: DateTime<Utc>,
    },
    Ready {
        ready_at: DateTime<Utc>,
    },
    MetricsPublished {
        evaluations: u64,
        published_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn authenticated(client_id: impl Into<String>) -> Self {
        Event::Authenticated {
            client_id: client_id.into(),
            authenticated_at: Utc::now(),
        }
    }

    pub fn fetched(snapshot: Arc<FlagSnapshot>) -> Self {
        Event::Fetched {
            snapshot,
            fetched_at: Utc::now(),
        }
    }

    pub fn evaluated(feature: impl Into<String>, result: Option<bool>, value: bool) -> Self {
        Event::Evaluated {
            feature: feature.into(),
            result,
            value,
            evaluated_at: Utc::now(),
        }
    }

    /// Capture an error for observers. The message is sanitized again since
    /// not every error source went through [`TogglesError::from_status`].
    pub fn error(error: &TogglesError) -> Self {
        Event::Error {
            code: error.code,
            status: error.status,
            message: sanitize_message(&error.message),
            occurred_at: Utc::now(),
        }
    }

    pub fn ready() -> Self {
        Event::Ready {
            ready_at: Utc::now(),
        }
    }

    pub fn metrics_published(evaluations: u64) -> Self {
        Event::MetricsPublished {
            evaluations,
            published_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Authenticated { .. } => EventKind::Authenticated,
            Event::Fetched { .. } => EventKind::Fetched,
            Event::Evaluated { .. } => EventKind::Evaluated,
            Event::Error { .. } => EventKind::Error,
            Event::Ready { .. } => EventKind::Ready,
            Event::MetricsPublished { .. } => EventKind::MetricsPublished,
        }
    }
}
