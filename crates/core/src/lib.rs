//! Shared primitives for every Rust crate in the orchestrator.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use auth::Principal;

/// Result type used across orchestrator crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Defines a UUID-backed opaque identifier newtype with the conventional
/// `new`/`from_uuid`/`as_uuid` constructors and `Display`/`Default` impls.
///
/// Every resource identifier in this workspace is a distinct Rust type
/// generated by this macro so that, for example, a `JobId` can never be
/// passed where a `RobotId` is expected.
#[macro_export]
macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: uuid::Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

define_uuid_id!(
    /// Tenant identifier used as the partition key for every persisted resource.
    TenantId
);

/// Common application error categories returned by every service in the
/// orchestrator. Maps onto HTTP responses at the API boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller did not present valid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller is authenticated but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Tenant has exhausted a provisioned quota.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Caller has exceeded an allowed request rate; retry after the given
    /// duration.
    #[error("rate limited, retry after {retry_after:?}: {message}")]
    RateLimited {
        /// Human-readable description of the limit that was hit.
        message: String,
        /// Minimum time the caller should wait before retrying.
        retry_after: Duration,
    },

    /// A distributed lease was lost or never held by the caller.
    #[error("lease lost: {0}")]
    LeaseLost(String),

    /// An operation would introduce a cycle in a dependency graph.
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    /// A downstream dependency (database, cache, network peer) failed in a
    /// way that is expected to be transient.
    #[error("transient I/O error: {0}")]
    TransientIO(String),

    /// An operation did not complete within its allotted time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// An append-only hash chain failed its continuity check.
    #[error("chain broken: {0}")]
    ChainBroken(String),

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns `true` for error kinds that a caller may reasonably retry
    /// without changing the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::TransientIO(_) | AppError::Timeout(_) | AppError::RateLimited { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString, TenantId};
    use std::time::Duration;

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn tenant_id_formats_as_uuid() {
        let tenant_id = TenantId::new();
        assert_eq!(tenant_id.to_string().len(), 36);
    }

    #[test]
    fn retryable_errors_are_classified() {
        assert!(AppError::Timeout("slow".to_owned()).is_retryable());
        assert!(AppError::RateLimited {
            message: "too many".to_owned(),
            retry_after: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!AppError::Validation("bad".to_owned()).is_retryable());
    }
}
