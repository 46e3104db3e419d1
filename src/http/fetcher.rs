//! Authenticated retrieval of the full flag set for one stage.

use reqwest::StatusCode;
use std::sync::Arc;

use super::client::{into_status_error, read_json, HttpClient};
use super::credentials::{Credential, CredentialProvider};
use super::retry::RetryPolicy;
use crate::core::{Event, EventBus, TogglesConfig};
use crate::error::Result;
use crate::types::FlagSnapshot;

/// Fetches [`FlagSnapshot`]s from the stage-scoped features endpoint.
///
/// A 401 renews the credential and tries again within the same retry budget.
/// Any other non-success status, and any transport failure, ends the call
/// with an error. Every failure is also published as an `Error` event.
pub struct RemoteFlagFetcher {
    http: HttpClient,
    endpoint: String,
    credentials: Arc<CredentialProvider>,
    retry: RetryPolicy,
    bus: EventBus,
}

impl RemoteFlagFetcher {
    pub fn new(
        http: HttpClient,
        config: &TogglesConfig,
        credentials: Arc<CredentialProvider>,
        bus: EventBus,
    ) -> Self {
        Self {
            http,
            endpoint: config.toggles_endpoint(),
            credentials,
            retry: config.retry_policy(),
            bus,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One round trip for the current flag set.
    ///
    /// Returns `Ok(None)` when every attempt was answered with 401; callers
    /// treat that as a miss.
    pub async fn fetch(&self) -> Result<Option<Arc<FlagSnapshot>>> {
        let result = self.fetch_with_retry().await;

        if let Err(ref error) = result {
            tracing::warn!(code = %error.code, status = ?error.status, "Flag fetch failed");
            self.bus.publish(Event::error(error));
        }

        result
    }

    async fn fetch_with_retry(&self) -> Result<Option<Arc<FlagSnapshot>>> {
        let attempts = self.retry.attempts();
        let mut credential = self.authorize().await?;

        for attempt in 1..=attempts {
            let response = self
                .http
                .get(&self.endpoint, &credential.authorization_header())
                .await?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                tracing::debug!(attempt, attempts, "Flag fetch unauthorized, renewing credential");
                credential = self.credentials.renew().await?;
                self.bus
                    .publish(Event::authenticated(self.credentials.client_id()));
                continue;
            }

            if status.is_success() {
                let snapshot: Arc<FlagSnapshot> = Arc::new(read_json(response).await?);

                tracing::debug!(
                    attempt,
                    features = snapshot.len(),
                    "Fetched flag snapshot"
                );
                self.bus.publish(Event::fetched(Arc::clone(&snapshot)));
                return Ok(Some(snapshot));
            }

            return Err(into_status_error(response).await);
        }

        tracing::warn!(attempts, "Flag fetch retries exhausted");
        Ok(None)
    }

    async fn authorize(&self) -> Result<Arc<Credential>> {
        let (credential, acquired) = self.credentials.obtain().await?;

        if acquired {
            self.bus
                .publish(Event::authenticated(self.credentials.client_id()));
        }

        Ok(credential)
    }
}
