//! Status conditions written back to custom resources.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// The remote resource matches the desired state and has converged.
    ResourceSynced,
    /// The resource cannot make progress without a spec or credential change.
    Terminal,
    /// The last pass failed but will be retried.
    Recoverable,
    /// Informational.
    Advisory,
    ReferencesResolved,
    LateInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(kind: ConditionKind, status: ConditionStatus) -> Self {
        Self {
            kind,
            status,
            reason: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Finds the condition of the given kind.
pub fn find(conditions: &[Condition], kind: ConditionKind) -> Option<&Condition> {
    conditions.iter().find(|c| c.kind == kind)
}

/// Inserts or replaces the condition with the same kind, keeping order otherwise.
pub fn upsert(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

pub fn remove(conditions: &mut Vec<Condition>, kind: ConditionKind) {
    conditions.retain(|c| c.kind != kind);
}

/// True when a `ResourceSynced=True` condition is present.
pub fn is_synced(conditions: &[Condition]) -> bool {
    find(conditions, ConditionKind::ResourceSynced).is_some_and(Condition::is_true)
}
