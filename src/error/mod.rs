use reqwest::StatusCode;
use thiserror::Error;

pub mod sanitizer;

pub use sanitizer::sanitize_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lifecycle errors
    InitFailed,
    NoRuntime,

    // Authentication errors
    AuthUnauthorized,
    AuthForbidden,

    // Transport errors
    NetworkError,
    NetworkTimeout,
    NetworkRetryLimit,

    // HTTP errors
    HttpRateLimited,
    HttpServerError,
    HttpUnexpectedStatus,
    HttpInvalidResponse,

    // Event errors
    EventHandlerFailed,
    EventHandlerPanicked,

    // Configuration errors
    ConfigMissingRequired,
    ConfigInvalidUrl,
    ConfigInvalidStage,
    ConfigInvalidPollInterval,
    ConfigInvalidCacheSize,
}

/// Broad classes of failure, used to decide how each component reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, DNS or timeout failure before a response was read.
    Transport,
    /// The remote service rejected the presented identity (401/403).
    Authentication,
    /// The remote service failed (5xx).
    Server,
    /// Any other unexpected response, including undecodable bodies.
    Protocol,
    /// A subscriber failed to handle an event.
    EventHandling,
    Configuration,
    Lifecycle,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InitFailed => "INIT_FAILED",
            ErrorCode::NoRuntime => "NO_RUNTIME",
            ErrorCode::AuthUnauthorized => "AUTH_UNAUTHORIZED",
            ErrorCode::AuthForbidden => "AUTH_FORBIDDEN",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorCode::NetworkRetryLimit => "NETWORK_RETRY_LIMIT",
            ErrorCode::HttpRateLimited => "HTTP_RATE_LIMITED",
            ErrorCode::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorCode::HttpUnexpectedStatus => "HTTP_UNEXPECTED_STATUS",
            ErrorCode::HttpInvalidResponse => "HTTP_INVALID_RESPONSE",
            ErrorCode::EventHandlerFailed => "EVENT_HANDLER_FAILED",
            ErrorCode::EventHandlerPanicked => "EVENT_HANDLER_PANICKED",
            ErrorCode::ConfigMissingRequired => "CONFIG_MISSING_REQUIRED",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigInvalidStage => "CONFIG_INVALID_STAGE",
            ErrorCode::ConfigInvalidPollInterval => "CONFIG_INVALID_POLL_INTERVAL",
            ErrorCode::ConfigInvalidCacheSize => "CONFIG_INVALID_CACHE_SIZE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::NetworkError | ErrorCode::NetworkTimeout => ErrorCategory::Transport,
            ErrorCode::AuthUnauthorized | ErrorCode::AuthForbidden => {
                ErrorCategory::Authentication
            }
            ErrorCode::HttpServerError => ErrorCategory::Server,
            ErrorCode::NetworkRetryLimit
            | ErrorCode::HttpRateLimited
            | ErrorCode::HttpUnexpectedStatus
            | ErrorCode::HttpInvalidResponse => ErrorCategory::Protocol,
            ErrorCode::EventHandlerFailed | ErrorCode::EventHandlerPanicked => {
                ErrorCategory::EventHandling
            }
            ErrorCode::ConfigMissingRequired
            | ErrorCode::ConfigInvalidUrl
            | ErrorCode::ConfigInvalidStage
            | ErrorCode::ConfigInvalidPollInterval
            | ErrorCode::ConfigInvalidCacheSize => ErrorCategory::Configuration,
            ErrorCode::InitFailed | ErrorCode::NoRuntime => ErrorCategory::Lifecycle,
        }
    }

    /// Whether a later attempt could plausibly succeed without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::NetworkTimeout
                | ErrorCode::NetworkRetryLimit
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpServerError
                | ErrorCode::AuthUnauthorized
                | ErrorCode::EventHandlerFailed
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct TogglesError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status of the response that caused this error, if any.
    pub status: Option<u16>,
    /// Raw response body, kept verbatim for diagnostics.
    pub body: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TogglesError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            body: None,
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            body: None,
            source: Some(Box::new(source)),
        }
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// The message is sanitized since the body may echo credentials back; the
    /// raw body is still available through [`TogglesError::body`].
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let (code, category) = match status {
            StatusCode::UNAUTHORIZED => (ErrorCode::AuthUnauthorized, "Authentication Error"),
            StatusCode::FORBIDDEN => (ErrorCode::AuthForbidden, "Authorization Error"),
            StatusCode::TOO_MANY_REQUESTS => (ErrorCode::HttpRateLimited, "Rate Limited"),
            s if s.is_server_error() => (ErrorCode::HttpServerError, "Server Error"),
            _ => (ErrorCode::HttpUnexpectedStatus, "Unexpected Response"),
        };

        Self {
            code,
            message: sanitize_message(&format!("{}: {} - {}", category, status.as_u16(), body)),
            status: Some(status.as_u16()),
            body: Some(body.to_string()),
            source: None,
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn network_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    pub fn is_config_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_transport_error(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::AuthUnauthorized
    }
}

pub type Result<T> = std::result::Result<T, TogglesError>;
