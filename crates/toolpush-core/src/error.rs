//! Error types shared across the Toolpush client.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Matches the trailing "(used/limit)" fragment the backend embeds in
/// quota rejection detail strings, e.g. "Daily message limit exceeded (10/10)".
static QUOTA_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)\s*/\s*(\d+)\)").expect("quota regex is valid"));

/// The error taxonomy produced by the transport layer and consumed by the
/// conversation store.
///
/// Every remote failure in the client is normalized into one of these
/// variants; the store decides user-visible behavior purely on the variant,
/// never on raw status codes or response bodies.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiError {
    /// No credential was obtainable; the request was never issued.
    #[error("not signed in")]
    AuthMissing,

    /// The backend rejected the credential (401/403).
    #[error("authentication rejected: {detail}")]
    AuthRejected { detail: String },

    /// The per-plan daily message quota is exhausted (402).
    #[error("daily message limit exceeded: {detail}")]
    QuotaExceeded {
        used: Option<u32>,
        limit: Option<u32>,
        detail: String,
    },

    /// The backend refused the request payload (422).
    #[error("validation failed: {detail}")]
    Validation { detail: String },

    /// Any other non-2xx response.
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    /// I/O failure, DNS failure, or timeout.
    #[error("network error: {message}")]
    Network { message: String },

    /// A resource that was expected to exist is gone (404).
    #[error("not found: {resource}")]
    NotFound { resource: String },
}

impl ApiError {
    pub fn auth_rejected(detail: impl Into<String>) -> Self {
        Self::AuthRejected {
            detail: detail.into(),
        }
    }

    /// Creates a QuotaExceeded error, parsing the used/limit pair out of the
    /// server detail string when present.
    pub fn quota_exceeded(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let (used, limit) = parse_quota_fragment(&detail);
        Self::QuotaExceeded {
            used,
            limit,
            detail,
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
        }
    }

    pub fn server(status: u16, detail: impl Into<String>) -> Self {
        Self::Server {
            status,
            detail: detail.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    pub fn is_auth_missing(&self) -> bool {
        matches!(self, Self::AuthMissing)
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extracts the used/limit pair from a quota detail string.
///
/// Returns `(None, None)` when the string carries no parseable fragment;
/// the error is still surfaced, just without structured counts.
pub fn parse_quota_fragment(detail: &str) -> (Option<u32>, Option<u32>) {
    match QUOTA_FRAGMENT.captures(detail) {
        Some(caps) => {
            let used = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let limit = caps.get(2).and_then(|m| m.as_str().parse().ok());
            (used, limit)
        }
        None => (None, None),
    }
}

/// A type alias for `Result<T, ApiError>`.
pub type Result<T> = std::result::Result<T, ApiError>;
