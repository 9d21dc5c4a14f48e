use thiserror::Error;

/// Typed error enum for origin server requests
///
/// Differentiates failure modes so callers can decide what to surface.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Authentication failed (401, 403)
    #[error("Authentication failed: {message} (status: {status})")]
    Authentication { status: u16, message: String },

    /// Rate limiting error (429)
    #[error("Rate limited: {message}")]
    RateLimit { message: String },

    /// Server error (500+)
    #[error("Server error: {message} (status: {status})")]
    ServerError { status: u16, message: String },

    /// Client error (400-499, excluding auth and rate limit)
    #[error("Client error: {message} (status: {status})")]
    ClientError { status: u16, message: String },

    /// Network/connection errors (timeout, connection refused, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed URL or header built from configuration
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error: {0}")]
    Other(String),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status, .. }
            | ApiError::ServerError { status, .. }
            | ApiError::ClientError { status, .. } => Some(*status),
            ApiError::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Create an error from a reqwest error
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Network(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            ApiError::Network(format!("Connection failed: {}", error))
        } else if error.is_request() || error.is_body() || error.is_decode() {
            ApiError::Network(format!("Request error: {}", error))
        } else {
            ApiError::Other(error.to_string())
        }
    }

    /// Create an error from an HTTP status code and response body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ApiError::Authentication {
                status,
                message: body,
            },
            429 => ApiError::RateLimit { message: body },
            400..=499 => ApiError::ClientError {
                status,
                message: body,
            },
            500..=599 => ApiError::ServerError {
                status,
                message: body,
            },
            _ => ApiError::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}
