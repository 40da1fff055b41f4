//! # Reconcile Context
//!
//! Every manager operation receives a [`ReconcileContext`]. It carries the
//! cancellation signal and the deadline for the current pass, and
//! [`ReconcileContext::run`] is how managers bound a remote call by both: the
//! call future is dropped as soon as either fires, so nothing outlives the
//! pass that started it.

use crate::error::{ResourceError, Result, TransientCause};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Tightens the deadline to `timeout` from now; never extends it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// A context cancelled whenever `self` is, with the same deadline.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails early if the pass is already over.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ResourceError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(ResourceError::Transient(TransientCause::DeadlineExceeded))
            }
            _ => Ok(()),
        }
    }

    /// Runs `call`, aborting it on cancellation or when the deadline passes.
    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResourceError::Cancelled),
            _ = deadline => Err(ResourceError::Transient(TransientCause::DeadlineExceeded)),
            result = call => result,
        }
    }
}
