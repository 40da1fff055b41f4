use controller_runtime::{ResourceError, TransientCause};
use thiserror::Error;

/// Errors returned by the in-memory cloud services.
///
/// Each variant mirrors a class of API error a real service would return, so
/// managers can map them onto the runtime's taxonomy with a plain `?`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Service is unavailable")]
    ServiceClosed,

    #[error("Service dropped the response channel")]
    ServiceDropped,

    #[error("Request was throttled")]
    Throttled,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The resource or one it depends on is not in a state that allows the call yet.
    #[error("Incorrect state: {0}")]
    IncorrectState(String),
}

impl From<BackendError> for ResourceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Throttled => ResourceError::Transient(TransientCause::Throttled),
            BackendError::ServiceClosed | BackendError::ServiceDropped => {
                ResourceError::Transient(TransientCause::Network(err.to_string()))
            }
            BackendError::IncorrectState(reason) => {
                ResourceError::Transient(TransientCause::EventualConsistency(reason))
            }
            BackendError::NotFound(what) => ResourceError::NotFound(what),
            BackendError::AlreadyExists(_) | BackendError::InvalidParameter(_) => {
                ResourceError::Terminal(err.to_string())
            }
        }
    }
}
