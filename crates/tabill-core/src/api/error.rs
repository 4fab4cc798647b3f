use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not signed in or session expired")]
    Unauthorized,

    /// Row-level security refused the query
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error code the auth service uses for a rejected password or refresh token
const INVALID_GRANT: &str = "invalid_grant";

impl ApiError {
    /// Human readable message from an error body.
    ///
    /// The REST layer answers `{"message": ...}`, the auth service
    /// `{"msg": ...}` or `{"error_description": ...}`; anything else is
    /// returned raw, truncated.
    fn message(body: &str) -> String {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = parsed.as_ref().and_then(|v| {
            ["message", "msg", "error_description"]
                .iter()
                .find_map(|field| v.get(field).and_then(Value::as_str))
        });
        let text = message.unwrap_or(body);

        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        }
    }

    fn is_invalid_grant(body: &str) -> bool {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("error_code"))
                    .and_then(Value::as_str)
                    .map(|code| code == INVALID_GRANT)
            })
            .unwrap_or(false)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 if Self::is_invalid_grant(body) => ApiError::InvalidCredentials,
            401 => ApiError::Unauthorized,
            403 => ApiError::PermissionDenied(Self::message(body)),
            404 => ApiError::NotFound(Self::message(body)),
            500..=599 => ApiError::ServerError(Self::message(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, Self::message(body))),
        }
    }
}
