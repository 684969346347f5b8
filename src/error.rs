//! Error types and handling for the MeteoBCN engine
//!
//! Upstream failures are classified into a closed set of [`ApiErrorCode`]s so
//! the orchestrator can decide whether to retry, fall back or surface them.

use crate::models::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Fixed taxonomy of provider/API failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    MissingApiKey,
    InvalidApiKey,
    RateLimited,
    NetworkError,
    Timeout,
    ProviderError,
    NotFound,
    InvalidParams,
    Unknown,
}

impl ApiErrorCode {
    /// Client-side failures that another attempt cannot fix
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ApiErrorCode::MissingApiKey
                | ApiErrorCode::InvalidApiKey
                | ApiErrorCode::InvalidParams
                | ApiErrorCode::NotFound
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorCode::MissingApiKey => "MISSING_API_KEY",
            ApiErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ApiErrorCode::RateLimited => "RATE_LIMITED",
            ApiErrorCode::NetworkError => "NETWORK_ERROR",
            ApiErrorCode::Timeout => "TIMEOUT",
            ApiErrorCode::ProviderError => "PROVIDER_ERROR",
            ApiErrorCode::NotFound => "NOT_FOUND",
            ApiErrorCode::InvalidParams => "INVALID_PARAMS",
            ApiErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure coming from an upstream provider
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ApiError {
    pub fn new<S: Into<String>>(code: ApiErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            details: BTreeMap::new(),
        }
    }

    pub fn missing_api_key<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::MissingApiKey, message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::Timeout, message)
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::NetworkError, message)
    }

    pub fn provider_error<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::ProviderError, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::new(ApiErrorCode::InvalidParams, message)
    }

    /// Tag the error with the provider that produced it
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_detail<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// Main error type for the MeteoBCN crate
#[derive(Error, Debug)]
pub enum MeteoError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Classified upstream failures
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MeteoError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            MeteoError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            MeteoError::Validation { message } => format!("Invalid input: {message}"),
            MeteoError::Api(err) => match err.code {
                ApiErrorCode::MissingApiKey | ApiErrorCode::InvalidApiKey => {
                    "The data provider rejected or lacks credentials. Please check your API keys."
                        .to_string()
                }
                ApiErrorCode::NetworkError | ApiErrorCode::Timeout => {
                    "Unable to reach the weather data providers. Please check your internet connection."
                        .to_string()
                }
                _ => err.message.clone(),
            },
            MeteoError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiErrorCode::MissingApiKey, false)]
    #[case(ApiErrorCode::InvalidApiKey, false)]
    #[case(ApiErrorCode::InvalidParams, false)]
    #[case(ApiErrorCode::NotFound, false)]
    #[case(ApiErrorCode::RateLimited, true)]
    #[case(ApiErrorCode::NetworkError, true)]
    #[case(ApiErrorCode::Timeout, true)]
    #[case(ApiErrorCode::ProviderError, true)]
    #[case(ApiErrorCode::Unknown, true)]
    fn test_retryable_codes(#[case] code: ApiErrorCode, #[case] retryable: bool) {
        assert_eq!(code.is_retryable(), retryable);
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ApiErrorCode::MissingApiKey).unwrap();
        assert_eq!(json, "\"MISSING_API_KEY\"");
        assert_eq!(ApiErrorCode::RateLimited.to_string(), "RATE_LIMITED");
    }

    #[test]
    fn test_api_error_builders() {
        let err = ApiError::not_found("station X9 unknown")
            .with_provider(ProviderId::Meteocat)
            .with_detail("status", 404);
        assert_eq!(err.code, ApiErrorCode::NotFound);
        assert_eq!(err.provider, Some(ProviderId::Meteocat));
        assert_eq!(err.details.get("status").map(String::as_str), Some("404"));
        assert_eq!(err.to_string(), "[NOT_FOUND] station X9 unknown");
    }

    #[test]
    fn test_user_messages() {
        let config_err = MeteoError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));

        let api_err: MeteoError = ApiError::timeout("slow").into();
        assert!(api_err.user_message().contains("Unable to reach"));

        let validation_err = MeteoError::validation("from after to");
        assert!(validation_err.user_message().contains("from after to"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MeteoError = io_err.into();
        assert!(matches!(err, MeteoError::Io { .. }));
    }
}
