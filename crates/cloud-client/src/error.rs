//! Cloud client errors

use thiserror::Error;

/// Errors that can occur when interacting with the cloud instance API
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status
    #[error("Cloud API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request rate exceeded at the provider
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Instance not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., empty instance ID)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CloudError {
    /// Whether retrying the same call later can succeed.
    ///
    /// Transport failures, throttling and server-side errors are transient.
    /// Missing instances, bad credentials, client errors and undecodable
    /// payloads reproduce on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Http(e) => !e.is_decode() && !e.is_builder(),
            CloudError::Api { status, .. } => *status >= 500,
            CloudError::Throttled(_) => true,
            CloudError::Serialization(_)
            | CloudError::Authentication(_)
            | CloudError::NotFound(_)
            | CloudError::InvalidRequest(_) => false,
        }
    }

    /// Whether the instance does not exist at the provider
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }
}
