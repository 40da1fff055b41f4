//! # Custom Resources
//!
//! [`CustomResource<S>`] is the local representation of one managed cloud
//! resource: Kubernetes metadata, the user's desired spec `S`, and the observed
//! status (identifiers, conditions, and type-specific output fields).
//!
//! The reconciler holds two instances per pass, *desired* (from the CR) and
//! *latest* (freshly observed by `read_one`), and hands both to the delta
//! engine.

use crate::condition::{self, Condition};
use crate::identifiers::{GroupKind, ResourceIdentifiers};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

/// Namespace/name of a custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set once the user deleted the CR; the finalizer keeps it around until
    /// the remote resource is gone.
    #[serde(default)]
    pub deletion_requested: bool,
    #[serde(default)]
    pub generation: u64,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

/// The desired-state half of a resource type.
///
/// Implemented once per resource type; the associated `Status` carries the
/// type's output-only fields.
pub trait ResourceSpec: Serialize + Clone + Debug + PartialEq + Send + Sync + 'static {
    type Status: Serialize + Clone + Debug + Default + PartialEq + Send + Sync + 'static;

    fn group_kind() -> GroupKind;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus<T> {
    #[serde(default)]
    pub identifiers: ResourceIdentifiers,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub fields: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomResource<S: ResourceSpec> {
    pub meta: ObjectMeta,
    pub spec: S,
    pub status: ResourceStatus<S::Status>,
}

impl<S: ResourceSpec> CustomResource<S> {
    pub fn new(meta: ObjectMeta, spec: S) -> Self {
        Self {
            meta,
            spec,
            status: ResourceStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }

    pub fn group_kind(&self) -> GroupKind {
        S::group_kind()
    }

    pub fn identifiers(&self) -> &ResourceIdentifiers {
        &self.status.identifiers
    }

    pub fn set_identifiers(&mut self, identifiers: ResourceIdentifiers) {
        self.status.identifiers = identifiers;
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    pub fn set_condition(&mut self, condition: Condition) {
        condition::upsert(&mut self.status.conditions, condition);
    }

    pub fn is_being_deleted(&self) -> bool {
        self.meta.deletion_requested
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta.annotations.get(key).map(String::as_str)
    }

    /// Takes the status of `observed`, keeping our own metadata, spec and conditions.
    pub fn absorb_status(&mut self, observed: &CustomResource<S>) {
        let conditions = std::mem::take(&mut self.status.conditions);
        self.status = observed.status.clone();
        self.status.conditions = conditions;
    }
}
