// src/error.rs

//! Unified error handling for the status watcher.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream asked us to slow down
    #[error("Rate limited while fetching {context}")]
    RateLimited { context: String },

    /// Fetch error for a single line or page
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Every tracked line failed this cycle
    #[error("All {lines} line fetches failed")]
    AllFetchesFailed { lines: usize },

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notify(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a rate-limit error for the given context.
    pub fn rate_limited(context: impl Into<String>) -> Self {
        Self::RateLimited {
            context: context.into(),
        }
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    /// Whether this error belongs to the rate-limit class (retried once).
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Http(e) => e.status() == Some(StatusCode::TOO_MANY_REQUESTS),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_classification() {
        assert!(AppError::rate_limited("central").is_rate_limited());
        assert!(!AppError::fetch("central", "boom").is_rate_limited());
        assert!(!AppError::config("missing token").is_rate_limited());
    }

    #[test]
    fn test_display_messages() {
        let err = AppError::fetch("line jubilee", "timed out");
        assert_eq!(err.to_string(), "Fetch error for line jubilee: timed out");

        let err = AppError::AllFetchesFailed { lines: 11 };
        assert_eq!(err.to_string(), "All 11 line fetches failed");
    }
}
