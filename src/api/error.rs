// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/api/error.rs - Error taxonomy for provider API transport

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failure (401, 403)
    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        status_code: u16,
    },

    /// Rate limit exceeded (429)
    #[error("rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        status_code: u16,
    },

    /// Resource not found (404)
    #[error("resource not found: {message}")]
    ResourceNotFound {
        message: String,
        status_code: u16,
    },

    /// Any other non-2xx response
    #[error("API error ({status_code}): {message}")]
    General {
        message: String,
        status_code: u16,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("failed to build request: {0}")]
    RequestBuild(String),

    #[error("failed to parse response: {0}")]
    JsonParse(String),

    #[error("network error: {0}")]
    Network(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => ApiError::Authentication {
                message,
                status_code,
            },
            429 => ApiError::RateLimit {
                message,
                status_code,
            },
            404 => ApiError::ResourceNotFound {
                message,
                status_code,
            },
            _ => ApiError::General {
                message,
                status_code,
            },
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimit { .. })
    }

    /// Server-side errors (5xx) are retried alongside rate limits.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimit { .. } => true,
            ApiError::General { status_code, .. } => *status_code >= 500,
            ApiError::Connection(_) | ApiError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status_code, .. }
            | ApiError::RateLimit { status_code, .. }
            | ApiError::ResourceNotFound { status_code, .. }
            | ApiError::General { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::Connection(err.to_string())
        } else if err.is_request() {
            ApiError::RequestBuild(err.to_string())
        } else if err.is_decode() {
            ApiError::JsonParse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert!(matches!(
            ApiError::from_status(401, "bad key"),
            ApiError::Authentication { .. }
        ));
        assert!(matches!(
            ApiError::from_status(403, "forbidden"),
            ApiError::Authentication { .. }
        ));
        assert!(matches!(
            ApiError::from_status(429, "slow down"),
            ApiError::RateLimit { .. }
        ));
        assert!(matches!(
            ApiError::from_status(404, "gone"),
            ApiError::ResourceNotFound { .. }
        ));
        assert!(matches!(
            ApiError::from_status(500, "boom"),
            ApiError::General { .. }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::from_status(429, "").is_retryable());
        assert!(ApiError::from_status(503, "").is_retryable());
        assert!(ApiError::Connection("refused".into()).is_retryable());
        assert!(!ApiError::from_status(401, "").is_retryable());
        assert!(!ApiError::from_status(404, "").is_retryable());
        assert!(!ApiError::from_status(400, "").is_retryable());
    }
}
