//! Provider error-response parsing.
//!
//! Handles the envelope shapes seen across completion APIs:
//! - Standard: `{"error": {"message": "...", "type": "..."}}`
//! - Detail:   `{"detail": "..."}`
//! - Flat:     `{"message": "...", "code": "..."}`

use serde_json::Value;

/// Parsed API error information.
pub struct ApiErrorInfo {
    /// Human-readable error message (internal only).
    pub message: String,
    /// Provider-specific error code, when present.
    pub code: Option<String>,
    /// Whether the request can be retried (429 or 5xx).
    pub retryable: bool,
}

/// Parse an API error response body into structured error info.
///
/// Tries the known JSON shapes in order of specificity and falls back to
/// the raw body text.
#[must_use]
pub fn parse_api_error(body: &str, status: u16) -> ApiErrorInfo {
    let retryable = status == 429 || status >= 500;

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json["error"]["message"].as_str() {
            return ApiErrorInfo {
                message: msg.to_string(),
                code: json["error"]["type"].as_str().map(String::from),
                retryable,
            };
        }
        if let Some(msg) = json["detail"].as_str().or_else(|| json["message"].as_str()) {
            return ApiErrorInfo {
                message: msg.to_string(),
                code: json["code"].as_str().map(String::from),
                retryable,
            };
        }
    }

    ApiErrorInfo {
        message: format!("HTTP {status}: {body}"),
        code: None,
        retryable,
    }
}
