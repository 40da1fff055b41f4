//! Convergence tracking for resources with asynchronous remote workflows.
//!
//! There are no push notifications; the state only moves when somebody polls
//! `IsSynced` and feeds the answer to [`SyncState::observe`].

use crate::error::{ErrorKind, ResourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    /// Next state after one `IsSynced` observation.
    ///
    /// Retryable errors leave the state alone; terminal ones fail it. `Failed`
    /// is sticky until [`SyncState::reset`].
    pub fn observe(self, observation: Result<bool, &ResourceError>) -> Self {
        match (self, observation) {
            (Self::Failed, _) => Self::Failed,
            (_, Ok(true)) => Self::Synced,
            (_, Ok(false)) => Self::Pending,
            (_, Err(e)) if matches!(e.kind(), ErrorKind::Terminal | ErrorKind::InvariantViolation) => {
                Self::Failed
            }
            (state, Err(_)) => state,
        }
    }

    /// Leaves `Failed` after the spec or credentials changed.
    pub fn reset(self) -> Self {
        Self::Pending
    }

    pub fn is_synced(self) -> bool {
        self == Self::Synced
    }
}
