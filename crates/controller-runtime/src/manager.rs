//! # Resource Manager
//!
//! [`ResourceManager`] is the CRUD+L contract every resource type implements
//! once. A manager is bound to one tenant (account + region) and one resource
//! type; the [`crate::reconciler::ResourceReconciler`] calls it in this order:
//!
//! ```text
//! ResolveReferences -> ReadOne -> delta -> Create | Update | Delete
//!                   -> LateInitialize -> EnsureTags -> IsSynced
//! ```
//!
//! ## Rules for implementors
//!
//! - Classify failures, never retry them. Throttling and timeouts are
//!   `Transient`; a missing remote resource is `NotFound`; everything the user
//!   has to fix is `Terminal`.
//! - Address remote resources through [`ResourceIdentifiers::address`]: once
//!   an ARN or ID exists it wins over the name.
//! - `update` applies exactly the fields in the delta it is handed. A delta
//!   naming a field that cannot change in place is an `InvariantViolation`.
//! - `delete` treats `NotFound` as success.
//! - Run every remote call through [`ReconcileContext::run`] so cancellation
//!   and deadlines are honoured.
//!
//! Managers are shared by every pass of their tenant, so they must be
//! `Send + Sync` and keep no per-resource mutable state.
//!
//! [`ResourceIdentifiers::address`]: crate::identifiers::ResourceIdentifiers::address

use crate::context::ReconcileContext;
use crate::delta::Delta;
use crate::error::Result;
use crate::identifiers::ResourceName;
use crate::reader::ReferenceReader;
use crate::resource::{CustomResource, ResourceSpec};
use crate::secret::SecretKeyReference;
use crate::tags::ServiceControllerMetadata;
use async_trait::async_trait;

#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    type Spec: ResourceSpec;

    /// Observes the remote resource that corresponds to `desired`'s identity.
    async fn read_one(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<Self::Spec>,
    ) -> Result<CustomResource<Self::Spec>>;

    /// Provisions a new remote resource; the result carries its identifiers.
    async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<Self::Spec>,
    ) -> Result<CustomResource<Self::Spec>>;

    /// Applies the fields named in `delta`, and only those.
    async fn update(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<Self::Spec>,
        latest: &CustomResource<Self::Spec>,
        delta: &Delta,
    ) -> Result<CustomResource<Self::Spec>>;

    /// Removes the remote resource. Already gone counts as deleted.
    async fn delete(
        &self,
        ctx: &ReconcileContext,
        latest: &CustomResource<Self::Spec>,
    ) -> Result<CustomResource<Self::Spec>>;

    /// Derives the ARN a resource named `name` has in this manager's tenant.
    ///
    /// `None` when the type has no derivation rule.
    fn arn_from_name(&self, name: &str) -> Option<ResourceName>;

    /// Copies server-assigned defaults into fields the user left unset.
    ///
    /// Calling it on its own output returns that output unchanged.
    async fn late_initialize(
        &self,
        _ctx: &ReconcileContext,
        resource: &CustomResource<Self::Spec>,
    ) -> Result<CustomResource<Self::Spec>> {
        Ok(resource.clone())
    }

    /// Replaces references to other CRs with the identifiers they resolve to.
    async fn resolve_references(
        &self,
        _ctx: &ReconcileContext,
        _reader: &dyn ReferenceReader,
        resource: &CustomResource<Self::Spec>,
    ) -> Result<CustomResource<Self::Spec>> {
        Ok(resource.clone())
    }

    /// Whether the remote resource has converged. Never mutates anything.
    async fn is_synced(
        &self,
        _ctx: &ReconcileContext,
        _resource: &CustomResource<Self::Spec>,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Applies the controller's ownership tags without touching foreign tags.
    async fn ensure_tags(
        &self,
        ctx: &ReconcileContext,
        resource: &CustomResource<Self::Spec>,
        metadata: &ServiceControllerMetadata,
    ) -> Result<()>;
}

/// Services the reconciler offers back to the managers it drives.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Reads the value of a Kubernetes secret key referenced from a spec.
    async fn secret_value(
        &self,
        ctx: &ReconcileContext,
        namespace: &str,
        reference: &SecretKeyReference,
    ) -> Result<String>;
}
