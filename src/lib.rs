//! Toggles Rust client
//!
//! Client for the Toggles feature flag service. Feature checks are answered
//! from a cached snapshot of the whole stage, refreshed once its TTL elapses,
//! and every state change is reported on an in-process event bus.
//!
//! # Quick Start
//!
//! ```no_run
//! use toggles::{TogglesClient, TogglesConfig};
//!
//! #[tokio::main]
//! async fn main() -> toggles::Result<()> {
//!     let config = TogglesConfig::builder("client_id", "client_secret")
//!         .stage("production")
//!         .build();
//!
//!     let client = TogglesClient::new(config)?;
//!     client.initialize().await?;
//!
//!     if client.is_enabled("dark-mode", false).await {
//!         println!("dark mode on");
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod http;
pub mod types;
mod client;

pub use types::{FeatureState, FlagSnapshot, ReleaseRef, ReleaseState, Stage};

pub use error::{ErrorCategory, ErrorCode, Result, TogglesError};

pub use core::{
    BusState, DeadLetter, EvaluationMetrics, Event, EventBus, EventBusConfig, EventKind,
    EventSubscriber, FailurePolicy, FeatureMetrics, FnSubscriber, LoggingSubscriber,
    RefreshCoordinator, SnapshotSource, SubscriptionId, TogglesConfig, TogglesConfigBuilder,
};

pub use http::{Credential, CredentialProvider, RemoteFlagFetcher, RetryPolicy};

pub use client::{TogglesClient, CLIENT_VERSION};
