// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Retry policies with URL-based classification for the LabelWatch client.
//!
//! Requests are classified into two categories with different error handling:
//!
//! - **AnnotationApi**: REST calls to the annotation server (`/api/...`).
//!   These fail fast on authorization errors (401/403) so an invalid key is
//!   reported immediately, but retry timeouts, rate limiting, and server
//!   errors.
//! - **Media**: everything else (image files served outside the API prefix).
//!   These retry all transient failures.
//!
//! The annotation server host is user-configured, so classification inspects
//! only the URL path rather than a fixed domain.
//!
//! # Configuration
//!
//! - `LABELWATCH_MAX_RETRIES`: Maximum retry attempts per request (default: 3)
//! - `LABELWATCH_TIMEOUT`: Request timeout in seconds (default: 30)

use url::Url;

/// Retry scope classification for URL-based retry policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Annotation server REST API calls (path under `/api`).
    ///
    /// These calls should fail fast on authorization errors but retry
    /// server errors and transient failures.
    AnnotationApi,

    /// Media file requests (task images and other non-API paths).
    ///
    /// These should retry aggressively on all transient failures.
    Media,
}

/// Classifies a URL to determine which retry policy to apply.
///
/// A URL is classified as [`RetryScope::AnnotationApi`] when it is an
/// HTTP/HTTPS URL whose path is exactly `/api` or starts with `/api/`
/// (not `/apis` or other prefixes). Everything else, including unparseable
/// URLs and non-HTTP schemes, is [`RetryScope::Media`].
///
/// # Examples
///
/// ```rust
/// use labelwatch_client::{RetryScope, classify_url};
///
/// assert_eq!(
///     classify_url("http://localhost:8080/api/projects"),
///     RetryScope::AnnotationApi
/// );
/// assert_eq!(
///     classify_url("http://localhost:8080/data/upload/whale.jpg"),
///     RetryScope::Media
/// );
/// ```
pub fn classify_url(url: &str) -> RetryScope {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return RetryScope::Media;
        }

        // Path must be exactly "/api" or start with "/api/" (not "/apis" etc.)
        let path = parsed.path();
        if path == "/api" || path.starts_with("/api/") {
            return RetryScope::AnnotationApi;
        }
    }

    RetryScope::Media
}

/// Creates a retry policy with URL-based classification.
///
/// Both scopes use the same configurable retry count
/// (`LABELWATCH_MAX_RETRIES`, default: 3); they differ only in which errors
/// trigger a retry. Authorization failures (401/403) on API calls are never
/// retried so the caller sees them immediately.
pub fn create_retry_policy() -> reqwest::retry::Builder {
    let max_retries = std::env::var("LABELWATCH_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    // Use wildcard host scope since we do URL inspection in classify_fn
    reqwest::retry::for_host("*")
        .max_retries_per_request(max_retries)
        .classify_fn(|req_rep| {
            let url = req_rep.uri().to_string();

            match classify_url(&url) {
                RetryScope::AnnotationApi => {
                    // API calls: never retry auth failures, retry server errors
                    match req_rep.status() {
                        Some(status) => match status.as_u16() {
                            401 | 403 => req_rep.success(), // Auth failures - don't retry
                            429 | 408 | 500..=599 => req_rep.retryable(),
                            _ => req_rep.success(),
                        },
                        // No status code means connection error, timeout, or
                        // other transport failure. These are safe to retry.
                        None if req_rep.error().is_some() => req_rep.retryable(),
                        None => req_rep.success(),
                    }
                }
                RetryScope::Media => {
                    // Media files: retry all transient errors
                    match req_rep.status() {
                        Some(status) => match status.as_u16() {
                            429 | 408 | 500..=599 | 409 | 423 => req_rep.retryable(),
                            _ => req_rep.success(),
                        },
                        None if req_rep.error().is_some() => req_rep.retryable(),
                        None => req_rep.success(),
                    }
                }
            }
        })
}

pub fn log_retry_configuration() {
    let max_retries = std::env::var("LABELWATCH_MAX_RETRIES").unwrap_or_else(|_| "3".to_string());
    let timeout = std::env::var("LABELWATCH_TIMEOUT").unwrap_or_else(|_| "30".to_string());
    log::debug!(
        "Retry configuration - max_retries={}, timeout={}s",
        max_retries,
        timeout
    );
}
