//! Error types for LLM provider operations
//!
//! Any of these errors ends the current user turn. The agent loop reports
//! them and waits for the user to resubmit; nothing is retried.

use thiserror::Error;

/// Errors that can occur when interacting with LLM providers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network-related errors (connection issues, DNS failures)
    #[error("Network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// Authentication errors (invalid API key, unauthorized access)
    #[error("Authentication error: {message}")]
    Auth {
        /// Error message
        message: String,
    },

    /// Rate limit errors (too many requests, quota exceeded)
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Error message
        message: String,
    },

    /// Invalid request errors (bad parameters, unknown model)
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error message
        message: String,
    },

    /// The transport gave up waiting for the provider
    #[error("Request timeout after {seconds} seconds")]
    Timeout {
        /// Timeout duration in seconds
        seconds: u64,
    },

    /// Errors reported by the LLM service itself
    #[error("Provider error: {message}")]
    Provider {
        /// Error message from provider
        message: String,
        /// Optional error code (HTTP status or provider code)
        code: Option<String>,
    },

    /// Malformed response bodies
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Configuration errors (missing key, unusable base URL)
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Unknown/unexpected errors
    #[error("Unknown error: {message}")]
    Unknown {
        /// Error message
        message: String,
    },
}

impl ProviderError {
    /// Returns true if this error indicates an authentication problem
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }

    /// Returns true if this error indicates a rate limit
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimit { .. })
    }

    /// Returns true for failures that happened before a response arrived
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::Network { .. } | ProviderError::Timeout { .. }
        )
    }

    /// Creates a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a rate limit error
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Creates an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Creates a provider error
    pub fn provider(message: impl Into<String>, code: Option<impl Into<String>>) -> Self {
        Self::Provider {
            message: message.into(),
            code: code.map(|c| c.into()),
        }
    }

    /// Creates a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unknown error
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            Self::serialization(format!("Failed to parse response: {}", err))
        } else {
            Self::network(format!("Request failed: {}", err))
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
