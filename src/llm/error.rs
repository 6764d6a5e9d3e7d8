//! Classified errors returned by the Messages API

use thiserror::Error;

use super::types::ApiErrorBody;

/// An HTTP or stream-level error reported by the API
#[derive(Debug, Clone, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiRequestError {
    /// HTTP status (stream errors are mapped onto the equivalent status)
    pub status: u16,
    /// API error type, e.g. `overloaded_error`
    pub error_type: Option<String>,
    /// Error message
    pub message: String,
}

impl ApiRequestError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: None,
            message: message.into(),
        }
    }

    /// Build from a non-success response body
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                error_type: Some(parsed.error.error_type),
                message: parsed.error.message,
            },
            Err(_) => Self::new(status, body.trim()),
        }
    }

    /// Build from an `error` event received mid-stream
    pub fn from_stream(error_type: &str, message: &str) -> Self {
        let status = match error_type {
            "rate_limit_error" => 429,
            "overloaded_error" => 529,
            "invalid_request_error" => 400,
            "authentication_error" => 401,
            "permission_error" => 403,
            "not_found_error" => 404,
            _ => 500,
        };
        Self {
            status,
            error_type: Some(error_type.to_string()),
            message: message.to_string(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429 || self.error_type.as_deref() == Some("rate_limit_error")
    }

    pub fn is_overloaded(&self) -> bool {
        self.status == 529 || self.error_type.as_deref() == Some("overloaded_error")
    }

    pub fn is_prompt_too_long(&self) -> bool {
        self.status == 400 && self.message.to_lowercase().contains("prompt is too long")
    }

    /// Statuses worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, 408 | 409 | 429) || self.status >= 500
    }

    /// Whether the agent should switch to its fallback model
    pub fn triggers_fallback(&self) -> bool {
        self.is_rate_limited() || self.is_overloaded()
    }
}

/// Find an `ApiRequestError` anywhere in an anyhow chain
pub fn find_api_error(err: &anyhow::Error) -> Option<&ApiRequestError> {
    err.chain().find_map(|e| e.downcast_ref::<ApiRequestError>())
}
