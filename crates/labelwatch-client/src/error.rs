// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::storage::StorageError;

/// Comprehensive error type for LabelWatch client operations.
///
/// This enum covers all possible error conditions that can occur when using
/// the LabelWatch client, from network issues to authorization problems and
/// configuration validation errors.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// Environment variable error.
    EnvError(std::env::VarError),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// API key storage error.
    StorageError(StorageError),
    /// The annotation server rejected the request with the given HTTP status
    /// code and response body.
    ApiError(u16, String),
    /// The annotation server rejected the API key (HTTP 401/403).
    Unauthorized,
    /// No API key is configured.
    EmptyKey,
    /// Server returned an invalid or unexpected response.
    InvalidResponse,
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<std::env::VarError> for Error {
    fn from(err: std::env::VarError) -> Self {
        Error::EnvError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::StorageError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::EnvError(e) => write!(f, "Environment variable error: {}", e),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::StorageError(e) => write!(f, "Key storage error: {}", e),
            Error::ApiError(status, msg) => write!(f, "API error {}: {}", status, msg),
            Error::Unauthorized => write!(f, "Unauthorized access"),
            Error::EmptyKey => write!(f, "API key is empty"),
            Error::InvalidResponse => write!(f, "Invalid server response"),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::EnvError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            Error::StorageError(e) => Some(e),
            _ => None,
        }
    }
}
