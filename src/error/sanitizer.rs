//! Credential redaction for error messages.
//!
//! Token and flag endpoints sometimes echo request material back in error
//! bodies. Anything that ends up in a log line or an `Error` event goes
//! through [`sanitize_message`] first, which replaces:
//!
//! - bearer and basic authorization values
//! - `access_token`, `refresh_token` and `id_token` JSON fields
//! - `client_secret` form or query values

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PATTERNS: Vec<(Regex, &'static str)> = vec![
        // Authorization header values
        (Regex::new(r"\bBearer\s+[A-Za-z0-9._~+/=-]{8,}").unwrap(), "Bearer [REDACTED]"),
        (Regex::new(r"\bBasic\s+[A-Za-z0-9+/]{8,}={0,2}").unwrap(), "Basic [REDACTED]"),
        // Token fields in JSON payloads
        (
            Regex::new(r#""(access_token|refresh_token|id_token)"\s*:\s*"[^"]*""#).unwrap(),
            r#""$1":"[REDACTED]""#,
        ),
        // Secrets in form bodies or query strings
        (Regex::new(r"(?i)(client_secret=)[^&\s]+").unwrap(), "${1}[REDACTED]"),
    ];
}

/// Replace credential material in `message` with placeholders.
///
/// ```
/// use toggles::error::sanitize_message;
///
/// let sanitized = sanitize_message("rejected Bearer eyJhbGciOi.abc");
/// assert_eq!(sanitized, "rejected Bearer [REDACTED]");
/// ```
pub fn sanitize_message(message: &str) -> String {
    let mut result = message.to_string();

    for (pattern, replacement) in PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}
