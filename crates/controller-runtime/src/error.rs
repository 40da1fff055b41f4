//! # Runtime Errors
//!
//! Every manager operation returns a [`ResourceError`]. The variants encode the
//! *kind* of failure rather than its source, because the reconciler is the only
//! place that decides what a failure means for the control loop (retry,
//! requeue, or surface a terminal condition to the user).
//!
//! | Kind | Meaning | Reconciler reaction |
//! |------|---------|---------------------|
//! | `NotFound` | Remote resource absent | Create path, or delete success |
//! | `Transient` | Throttling, timeouts, eventual consistency | Retry with backoff |
//! | `Unresolved` | Referenced CR exists but is not synced yet | Bounded requeue |
//! | `Terminal` | Credentials, authorization, malformed spec | Terminal condition, no retry |
//! | `InvariantViolation` | Bug in a resource-type implementation | Terminal condition, loud log |
//! | `Cancelled` | Caller cancelled the pass | Nothing, the pass is abandoned |

use std::time::Duration;

/// Result alias used across the runtime.
pub type Result<T, E = ResourceError> = std::result::Result<T, E>;

/// Errors returned by resource managers and the runtime around them.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("transient failure: {0}")]
    Transient(TransientCause),
    #[error("unresolved reference to {reference}: {reason}")]
    Unresolved { reference: String, reason: String },
    #[error("terminal failure: {0}")]
    Terminal(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Why a transient failure happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransientCause {
    #[error("request throttled")]
    Throttled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("network error: {0}")]
    Network(String),
    #[error("remote state not yet consistent: {0}")]
    EventualConsistency(String),
    #[error("requeue requested after {0:?}")]
    RequeueAfter(Duration),
}

/// The classification the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Transient,
    Unresolved,
    Terminal,
    InvariantViolation,
    Cancelled,
}

impl ResourceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::Terminal(reason.into())
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }

    pub fn unresolved(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unresolved {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Asks the reconciler to come back later without treating the pass as failed.
    pub fn requeue_after(after: Duration) -> Self {
        Self::Transient(TransientCause::RequeueAfter(after))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Unresolved { .. } => ErrorKind::Unresolved,
            Self::Terminal(_) => ErrorKind::Terminal,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the same pass may succeed later without a spec or credential change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::Unresolved | ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ResourceError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            ResourceError::Transient(TransientCause::Throttled).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ResourceError::unresolved("vpc-x", "not synced").kind(),
            ErrorKind::Unresolved
        );
        assert_eq!(ResourceError::terminal("denied").kind(), ErrorKind::Terminal);
        assert_eq!(
            ResourceError::invariant("bad delta").kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ResourceError::requeue_after(Duration::from_secs(5)).is_retryable());
        assert!(ResourceError::unresolved("a", "b").is_retryable());
        assert!(!ResourceError::terminal("denied").is_retryable());
        assert!(!ResourceError::invariant("bug").is_retryable());
        assert!(!ResourceError::Cancelled.is_retryable());
    }

    #[test]
    fn test_display_includes_reference() {
        let err = ResourceError::unresolved("default/vpc-x", "resource not synced");
        let msg = err.to_string();
        assert!(msg.contains("default/vpc-x"));
        assert!(msg.contains("resource not synced"));
    }
}
