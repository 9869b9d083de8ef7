//! Error types for unpacker-gateway

use thiserror::Error;

/// Errors raised while building the gateway. Per-call failures are
/// `InvocationError`s instead.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A roster role names a backend with no provider spec
    #[error("backend {0} is not configured")]
    UnknownBackend(String),

    /// The API key variable for a backend is unset or empty
    #[error("API key for backend {backend} not found in environment variable {env}")]
    MissingApiKey { backend: String, env: String },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Http(err.to_string())
    }
}

/// Result type for gateway construction
pub type Result<T> = std::result::Result<T, GatewayError>;
