//! # Controller Runtime
//!
//! This crate is the reconciliation core of a controller that manages cloud
//! resources on behalf of declarative custom resources (CRs). Given a desired
//! state and a possibly absent, possibly drifted, possibly still converging
//! remote resource, it decides generically, for any resource type, what to do
//! about it.
//!
//! ## Architecture Overview
//!
//! The runtime separates concerns into three layers:
//!
//! 1. **Resource Layer** ([`ResourceSpec`], [`CustomResource`]) - what a CR of
//!    one type looks like: spec, status, identifiers, conditions.
//! 2. **Manager Layer** ([`ResourceManager`], [`ResourceManagerFactory`]) -
//!    per-type CRUD+L against the remote system, scoped to one tenant.
//! 3. **Control Layer** ([`ResourceReconciler`], [`TenantRegistry`]) - the
//!    generic loop that calls managers in the right order and turns their
//!    errors into conditions and requeues.
//!
//! A resource type is written once, as a spec type plus a manager; the runtime
//! does the rest.
//!
//! ## One Pass
//!
//! ```text
//! ResolveReferences --Unresolved--> requeue (no Create)
//!        |
//!     ReadOne --NotFound--> Create
//!        |
//!      delta --empty--> no-op
//!        |   \--non-empty--> Update(delta)
//!        v
//! LateInitialize -> EnsureTags -> IsSynced --false--> requeue
//!                                    \--true--> ResourceSynced
//! ```
//!
//! The [`delta`](compare::ComparisonPolicy) is computed in exactly one place,
//! from the per-type list of comparable fields, and handed unchanged to
//! `update`. Managers never re-derive it.
//!
//! ## Tenant Scoping
//!
//! There is no global state. Each (account, region, kind) maps to one
//! long-lived manager held by a [`TenantRegistry`]; every manager owns a
//! cloned [`ControllerConfig`] so no tenant can observe another one's copy.
//!
//! ## Cancellation
//!
//! Every manager operation gets a [`ReconcileContext`]. Remote calls run
//! through [`ReconcileContext::run`], which drops them as soon as the pass is
//! cancelled or its deadline passes.
//!
//! ## Testing
//!
//! The [`mock`] module provides [`MockResourceManager`](mock::MockResourceManager),
//! an expectation-queue implementation of the manager contract, and
//! [`MockFactory`](mock::MockFactory) to build it through the normal factory
//! path. Reconciler tests use them to assert exactly which operations ran.

pub mod compare;
pub mod condition;
pub mod config;
pub mod context;
pub mod delta;
pub mod error;
pub mod factory;
pub mod identifiers;
pub mod manager;
pub mod metrics;
pub mod mock;
pub mod reader;
pub mod reconciler;
pub mod resource;
pub mod secret;
pub mod session;
pub mod sync;
pub mod tags;
pub mod tenant;
pub mod tracing;

// Re-export core types for convenience
pub use compare::{CollectionOrder, ComparisonPolicy, FieldRule, Normalization};
pub use condition::{Condition, ConditionKind, ConditionStatus};
pub use config::{ConfigError, ControllerConfig};
pub use context::ReconcileContext;
pub use delta::{Delta, Difference, FieldPath, Insignificance};
pub use error::{ErrorKind, ResourceError, Result, TransientCause};
pub use factory::{ManagerScope, ResourceDescriptor, ResourceManagerFactory};
pub use identifiers::{
    AccountId, Address, GroupKind, PartialObjectMeta, Region, ResourceIdentifiers, ResourceName,
    TargetKubernetesResource,
};
pub use manager::{Reconciler, ResourceManager};
pub use metrics::Metrics;
pub use reader::{InMemoryReader, ObjectSnapshot, ReferenceReader};
pub use reconciler::{Backoff, ReconcileAction, ReconcileOutcome, Requeue, ResourceReconciler};
pub use resource::{CustomResource, ObjectKey, ObjectMeta, ResourceSpec, ResourceStatus};
pub use secret::{SecretKeyReference, SecretStore};
pub use session::{Credentials, Session};
pub use sync::SyncState;
pub use tags::{ServiceControllerMetadata, Tags};
pub use tenant::{FactoryRegistry, TenantRegistry};
