use reqwest::Url;
use std::time::Duration;

use super::event_bus::FailurePolicy;
use crate::error::{ErrorCode, Result, TogglesError};
use crate::http::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.togglize.com";
pub const DEFAULT_STAGE: &str = "development";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CACHE_SIZE: usize = 16;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

const TOKEN_PATH: &str = "/token";
const CLIENT_NAME: &str = "toggles-client-rust";

#[derive(Clone)]
pub struct TogglesConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_token_url: String,
    pub base_toggles_url: String,
    pub stage: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// How long a fetched snapshot counts as fresh. Expiry only triggers a
    /// refresh; the old snapshot stays available as a fallback.
    pub cache_ttl: Duration,
    pub max_cache_size: usize,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub fetch_on_startup: bool,
    pub event_poll_interval: Duration,
    pub failure_policy: FailurePolicy,
    pub instance_id: String,
}

impl std::fmt::Debug for TogglesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TogglesConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("base_token_url", &self.base_token_url)
            .field("base_toggles_url", &self.base_toggles_url)
            .field("stage", &self.stage)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_cache_size", &self.max_cache_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("fetch_on_startup", &self.fetch_on_startup)
            .field("event_poll_interval", &self.event_poll_interval)
            .field("failure_policy", &self.failure_policy)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl TogglesConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        TogglesConfigBuilder::new(client_id, client_secret).build()
    }

    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> TogglesConfigBuilder {
        TogglesConfigBuilder::new(client_id, client_secret)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}{}", self.base_token_url.trim_end_matches('/'), TOKEN_PATH)
    }

    pub fn toggles_endpoint(&self) -> String {
        format!(
            "{}/stages/{}/features",
            self.base_toggles_url.trim_end_matches('/'),
            self.stage
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(TogglesError::config_error(
                ErrorCode::ConfigMissingRequired,
                "Client ID is required",
            ));
        }

        if self.client_secret.is_empty() {
            return Err(TogglesError::config_error(
                ErrorCode::ConfigMissingRequired,
                "Client secret is required",
            ));
        }

        validate_url("token", &self.base_token_url)?;
        validate_url("toggles", &self.base_toggles_url)?;

        if matches!(self.stage.as_str(), "" | "." | "..")
            || !self.stage.chars().all(is_unreserved)
        {
            return Err(TogglesError::config_error(
                ErrorCode::ConfigInvalidStage,
                format!("Invalid stage name: {:?}", self.stage),
            ));
        }

        if self.event_poll_interval.is_zero() {
            return Err(TogglesError::config_error(
                ErrorCode::ConfigInvalidPollInterval,
                "Event poll interval must be positive",
            ));
        }

        if self.max_cache_size == 0 {
            return Err(TogglesError::config_error(
                ErrorCode::ConfigInvalidCacheSize,
                "Cache size must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Characters a stage name may use unescaped in a URL path segment.
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| {
        TogglesError::with_source(
            ErrorCode::ConfigInvalidUrl,
            format!("Invalid {} base URL: {}", name, value),
            e,
        )
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(TogglesError::config_error(
            ErrorCode::ConfigInvalidUrl,
            format!("Unsupported scheme for {} base URL: {}", name, scheme),
        )),
    }
}

pub struct TogglesConfigBuilder {
    client_id: String,
    client_secret: String,
    base_token_url: String,
    base_toggles_url: String,
    stage: String,
    max_retries: u32,
    retry_delay: Duration,
    cache_ttl: Duration,
    max_cache_size: usize,
    connect_timeout: Duration,
    timeout: Duration,
    fetch_on_startup: bool,
    event_poll_interval: Duration,
    failure_policy: FailurePolicy,
    instance_id: Option<String>,
}

impl TogglesConfigBuilder {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_token_url: DEFAULT_BASE_URL.to_string(),
            base_toggles_url: DEFAULT_BASE_URL.to_string(),
            stage: DEFAULT_STAGE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            fetch_on_startup: true,
            event_poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
            failure_policy: FailurePolicy::default(),
            instance_id: None,
        }
    }

    /// Point both the token and toggles endpoints at `url`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_token_url = url.clone();
        self.base_toggles_url = url;
        self
    }

    pub fn base_token_url(mut self, url: impl Into<String>) -> Self {
        self.base_token_url = url.into();
        self
    }

    pub fn base_toggles_url(mut self, url: impl Into<String>) -> Self {
        self.base_toggles_url = url.into();
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fetch_on_startup(mut self, fetch: bool) -> Self {
        self.fetch_on_startup = fetch;
        self
    }

    pub fn event_poll_interval(mut self, interval: Duration) -> Self {
        self.event_poll_interval = interval;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    pub fn build(self) -> TogglesConfig {
        TogglesConfig {
            client_id: self.client_id,
            client_secret: self.client_secret,
            base_token_url: self.base_token_url,
            base_toggles_url: self.base_toggles_url,
            stage: self.stage,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            cache_ttl: self.cache_ttl,
            max_cache_size: self.max_cache_size,
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
            fetch_on_startup: self.fetch_on_startup,
            event_poll_interval: self.event_poll_interval,
            failure_policy: self.failure_policy,
            instance_id: self
                .instance_id
                .unwrap_or_else(|| format!("{}-{}", CLIENT_NAME, std::process::id())),
        }
    }
}
