//! Read access to other custom resources, used for reference resolution.
//!
//! Managers never talk to the Kubernetes API directly. They get a
//! [`ReferenceReader`] and look at [`ObjectSnapshot`]s: just enough of a CR
//! (identity, conditions, labels) to decide whether a reference can be
//! resolved yet.

use crate::condition::{self, Condition};
use crate::error::{ResourceError, Result};
use crate::identifiers::{GroupKind, ResourceIdentifiers};
use crate::resource::{CustomResource, ObjectKey, ResourceSpec};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What a manager can see of another custom resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub key: ObjectKey,
    pub group_kind: GroupKind,
    pub identifiers: ResourceIdentifiers,
    pub conditions: Vec<Condition>,
    pub labels: BTreeMap<String, String>,
    pub deletion_requested: bool,
}

impl ObjectSnapshot {
    pub fn of<S: ResourceSpec>(resource: &CustomResource<S>) -> Self {
        Self {
            key: resource.key(),
            group_kind: resource.group_kind(),
            identifiers: resource.identifiers().clone(),
            conditions: resource.conditions().to_vec(),
            labels: resource.meta.labels.clone(),
            deletion_requested: resource.is_being_deleted(),
        }
    }

    pub fn is_synced(&self) -> bool {
        condition::is_synced(&self.conditions)
    }

    fn matches(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

#[async_trait]
pub trait ReferenceReader: Send + Sync {
    /// Fetches one CR; `NotFound` when it does not exist.
    async fn get(&self, group_kind: &GroupKind, key: &ObjectKey) -> Result<ObjectSnapshot>;

    /// Lists CRs of `group_kind` in `namespace` whose labels contain `selector`.
    async fn list(
        &self,
        group_kind: &GroupKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ObjectSnapshot>>;
}

/// Fetches a referenced CR and insists that its remote resource is ready.
///
/// A missing CR is `NotFound`; a CR that exists but is not synced, or is being
/// deleted, is `Unresolved` so the caller requeues instead of failing.
pub async fn require_synced(
    reader: &dyn ReferenceReader,
    group_kind: &GroupKind,
    key: &ObjectKey,
) -> Result<ObjectSnapshot> {
    let snapshot = reader.get(group_kind, key).await?;
    if snapshot.deletion_requested {
        return Err(ResourceError::unresolved(
            format!("{group_kind} {key}"),
            "referenced resource is being deleted",
        ));
    }
    if !snapshot.is_synced() {
        return Err(ResourceError::unresolved(
            format!("{group_kind} {key}"),
            "referenced resource is not synced yet",
        ));
    }
    Ok(snapshot)
}

type SnapshotMap = BTreeMap<(GroupKind, ObjectKey), ObjectSnapshot>;

/// A [`ReferenceReader`] over an in-process map of snapshots.
///
/// Clones share the same map, so whoever persists reconciled resources can
/// publish them while managers read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReader {
    objects: Arc<RwLock<SnapshotMap>>,
}

impl InMemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: ObjectSnapshot) {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert((snapshot.group_kind.clone(), snapshot.key.clone()), snapshot);
    }

    pub fn publish<S: ResourceSpec>(&self, resource: &CustomResource<S>) {
        self.insert(ObjectSnapshot::of(resource));
    }

    pub fn remove(&self, group_kind: &GroupKind, key: &ObjectKey) -> Option<ObjectSnapshot> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.remove(&(group_kind.clone(), key.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReferenceReader for InMemoryReader {
    async fn get(&self, group_kind: &GroupKind, key: &ObjectKey) -> Result<ObjectSnapshot> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects
            .get(&(group_kind.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| ResourceError::not_found(format!("{group_kind} {key}")))
    }

    async fn list(
        &self,
        group_kind: &GroupKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ObjectSnapshot>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .values()
            .filter(|s| &s.group_kind == group_kind && s.key.namespace == namespace)
            .filter(|s| s.matches(selector))
            .cloned()
            .collect())
    }
}
