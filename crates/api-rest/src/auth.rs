use axum::http::{HeaderMap, StatusCode};

/// Header carrying the API key on backend-administration routes.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiKeyError {
    #[error("API_KEY not configured")]
    NotConfigured,
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

impl ApiKeyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiKeyError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiKeyError::Missing | ApiKeyError::Invalid => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiKeyError::NotConfigured => "API_KEY not configured",
            ApiKeyError::Missing => "Missing API key",
            ApiKeyError::Invalid => "Invalid API key",
        }
    }
}

/// Validates the provided API key against the key configured at startup.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), ApiKeyError> {
    let expected = expected.ok_or(ApiKeyError::NotConfigured)?;
    let provided = provided.ok_or(ApiKeyError::Missing)?;

    if provided == expected {
        Ok(())
    } else {
        Err(ApiKeyError::Invalid)
    }
}

/// Reads the API key header, if present and valid UTF-8.
pub fn api_key_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}
