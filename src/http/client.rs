use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;

use crate::core::TogglesConfig;
use crate::error::{ErrorCode, Result, TogglesError};

const USER_AGENT: &str = concat!("toggles-client-rust/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper over a pooled reqwest client carrying the configured timeouts.
///
/// Callers get the raw [`Response`] back so they can apply their own status
/// policy; only transport failures are turned into errors here.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &TogglesConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                TogglesError::with_source(ErrorCode::InitFailed, "Failed to create HTTP client", e)
            })?;

        Ok(Self { client })
    }

    /// Authenticated JSON GET.
    pub async fn get(&self, url: &str, authorization: &str) -> Result<Response> {
        self.client
            .get(url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(convert_error)
    }

    /// Form POST with HTTP basic authentication.
    pub async fn post_form(
        &self,
        url: &str,
        username: &str,
        password: &str,
        form: &[(&str, &str)],
    ) -> Result<Response> {
        self.client
            .post(url)
            .basic_auth(username, Some(password))
            .header(header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(convert_error)
    }
}

/// Decode a success response body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await.map_err(|e| {
        TogglesError::with_source(ErrorCode::HttpInvalidResponse, "Failed to read response", e)
    })?;

    serde_json::from_str(&body).map_err(|e| {
        TogglesError::with_source(
            ErrorCode::HttpInvalidResponse,
            format!("Failed to parse response: {}", e),
            e,
        )
    })
}

/// Turn a non-success response into an error carrying its status and body.
pub async fn into_status_error(response: Response) -> TogglesError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    TogglesError::from_status(status, &body)
}

fn convert_error(error: reqwest::Error) -> TogglesError {
    if error.is_timeout() {
        TogglesError::with_source(ErrorCode::NetworkTimeout, "Request timed out", error)
    } else if error.is_connect() {
        TogglesError::with_source(ErrorCode::NetworkError, "Connection failed", error)
    } else {
        TogglesError::with_source(ErrorCode::NetworkError, error.to_string(), error)
    }
}
