// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Error types for Revu
//!
//! This module defines all error types used throughout the crate, plus the
//! client/server split the transport layer needs to map failures to status
//! codes.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Revu operations
#[derive(Error, Debug)]
pub enum RevuError {
    /// Configuration errors (missing credential, bad settings file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reused session id exists with a different pr_id or mode
    #[error("Session {session_id} exists but with different pr_id or mode (bound to pr_id={pr_id}, mode={mode})")]
    SessionConflict {
        session_id: Uuid,
        pr_id: String,
        mode: String,
    },

    /// An explicitly supplied session id does not resolve
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    /// A pull request's index could not be loaded (missing dir, zero partitions)
    #[error("Index error: {0}")]
    IndexLoad(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// API-related errors from the language-model provider
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unhandled failures in pipeline glue
    #[error("Internal error: {0}")]
    Internal(String),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response (retryable)
    #[error("Request timed out")]
    Timeout,
}

/// Result type alias for Revu operations
pub type Result<T> = std::result::Result<T, RevuError>;

impl RevuError {
    /// Whether this error is the caller's fault.
    ///
    /// Session-identity failures abort the request and map to 4xx; everything
    /// else that escapes the pipeline is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RevuError::SessionConflict { .. }
                | RevuError::SessionNotFound(_)
                | RevuError::InvalidInput(_)
        )
    }

    /// HTTP status code this error should map to at the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            RevuError::SessionConflict { .. } | RevuError::InvalidInput(_) => 400,
            RevuError::SessionNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Caller-visible message. Client errors carry their detail; server
    /// errors return a generic message, full detail stays in logs.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "An internal error occurred while processing the request.".to_string()
        }
    }
}

impl From<anyhow::Error> for RevuError {
    fn from(err: anyhow::Error) -> Self {
        RevuError::Internal(err.to_string())
    }
}
