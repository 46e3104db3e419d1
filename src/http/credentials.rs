//! Client-credentials exchange and the bearer credential it yields.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::sleep;

use super::client::{into_status_error, read_json, HttpClient};
use super::retry::RetryPolicy;
use crate::core::TogglesConfig;
use crate::error::{ErrorCode, Result, TogglesError};

/// Prefix used when presenting a credential in an `Authorization` header.
pub const TOKEN_PREFIX: &str = "Bearer";

const GRANT_TYPE: &str = "client_credentials";
const SCOPE: &str = "programmatic_client";

/// Body of a successful token exchange. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// An opaque bearer token. Renewal replaces the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Value for the `Authorization` header, e.g. `Bearer abc123`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", TOKEN_PREFIX, self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Obtains and holds the bearer credential for one client identity.
///
/// No expiry is tracked here. Callers that see the credential rejected ask
/// for a new one through [`CredentialProvider::renew`].
pub struct CredentialProvider {
    http: HttpClient,
    endpoint: String,
    client_id: String,
    client_secret: String,
    retry: RetryPolicy,
    current: RwLock<Option<Arc<Credential>>>,
    acquire_gate: tokio::sync::Mutex<()>,
}

impl CredentialProvider {
    pub fn new(http: HttpClient, config: &TogglesConfig) -> Self {
        Self {
            http,
            endpoint: config.token_endpoint(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            retry: config.retry_policy(),
            current: RwLock::new(None),
            acquire_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The credential held right now, without touching the network.
    pub fn cached(&self) -> Option<Arc<Credential>> {
        self.current.read().clone()
    }

    /// Return the held credential, exchanging for one first if none is held.
    pub async fn current_token(&self) -> Result<Arc<Credential>> {
        self.obtain().await.map(|(credential, _)| credential)
    }

    /// Like [`current_token`](Self::current_token), but also reports whether
    /// this call performed the exchange.
    pub(crate) async fn obtain(&self) -> Result<(Arc<Credential>, bool)> {
        if let Some(credential) = self.cached() {
            return Ok((credential, false));
        }

        // Concurrent first callers share one exchange.
        let _gate = self.acquire_gate.lock().await;
        if let Some(credential) = self.cached() {
            return Ok((credential, false));
        }

        self.renew().await.map(|credential| (credential, true))
    }

    /// Perform a client-credentials exchange and replace the held credential.
    ///
    /// 401, 403 and 5xx responses fail at once. Other non-success responses
    /// are retried with a linearly growing delay until the retry budget runs
    /// out, after which the last response becomes the error. Transport
    /// failures are never retried here.
    pub async fn renew(&self) -> Result<Arc<Credential>> {
        let attempts = self.retry.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let response = self
                .http
                .post_form(
                    &self.endpoint,
                    &self.client_id,
                    &self.client_secret,
                    &[("grant_type", GRANT_TYPE), ("scope", SCOPE)],
                )
                .await?;

            let status = response.status();

            if status.is_success() {
                let body: TokenResponse = read_json(response).await?;
                let credential = Arc::new(Credential::new(body.access_token));
                *self.current.write() = Some(Arc::clone(&credential));

                tracing::debug!(
                    client_id = %self.client_id,
                    attempt,
                    expires_in = ?body.expires_in,
                    "Access token renewed"
                );
                return Ok(credential);
            }

            let error = into_status_error(response).await;

            if is_fatal(status) {
                tracing::warn!(status = status.as_u16(), "Token exchange rejected");
                return Err(error);
            }

            tracing::debug!(
                status = status.as_u16(),
                attempt,
                attempts,
                "Token exchange failed, will retry"
            );
            last_error = Some(error);

            if self.retry.has_remaining(attempt) {
                sleep(self.retry.delay_for(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TogglesError::network_error(ErrorCode::NetworkRetryLimit, "Token exchange retries exhausted")
        }))
    }
}

/// Statuses that end a token exchange without further attempts.
pub fn is_fatal(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
}
