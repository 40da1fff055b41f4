//! # Resource Manager Factory
//!
//! A [`ResourceManagerFactory`] exists once per resource type. It advertises
//! the type's static policy (adoptability, periodic re-check interval, how to
//! compare desired and latest) and builds tenant-scoped managers on demand.
//!
//! Factories never cache managers themselves; [`crate::tenant::TenantRegistry`]
//! makes sure each (account, region, kind) gets exactly one.

use crate::compare::ComparisonPolicy;
use crate::config::ControllerConfig;
use crate::context::ReconcileContext;
use crate::delta::Delta;
use crate::error::{ResourceError, Result};
use crate::identifiers::{AccountId, GroupKind, Region};
use crate::manager::{Reconciler, ResourceManager};
use crate::metrics::Metrics;
use crate::resource::{CustomResource, ResourceSpec};
use crate::session::Session;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Instrument;

type SpecOf<F> = <<F as ResourceManagerFactory>::Manager as ResourceManager>::Spec;

pub trait ResourceManagerFactory: Send + Sync + 'static {
    type Manager: ResourceManager;

    fn descriptor(&self) -> ResourceDescriptor<SpecOf<Self>>;

    /// Builds a manager for one tenant.
    ///
    /// `config` is moved in so the manager owns its own snapshot. Fails with a
    /// terminal error when `session` cannot act for `account_id` in `region`.
    fn manager_for(
        &self,
        config: ControllerConfig,
        metrics: Metrics,
        reconciler: Arc<dyn Reconciler>,
        session: &Session,
        account_id: AccountId,
        region: Region,
    ) -> Result<Self::Manager>;

    /// Whether remote resources this controller did not create may be adopted.
    fn is_adoptable(&self) -> bool;

    /// Seconds until a synced resource is checked for drift again; 0 disables it.
    fn requeue_on_success_seconds(&self) -> u64;
}

/// Per-type metadata the reconciler needs besides the manager itself.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor<S> {
    group_kind: GroupKind,
    policy: ComparisonPolicy,
    finalizer: String,
    _spec: PhantomData<fn() -> S>,
}

impl<S: ResourceSpec> ResourceDescriptor<S> {
    pub fn new(policy: ComparisonPolicy) -> Self {
        let group_kind = S::group_kind();
        let finalizer = format!("finalizers.{}/{}", group_kind.group, group_kind.kind);
        Self {
            group_kind,
            policy,
            finalizer,
            _spec: PhantomData,
        }
    }

    pub fn group_kind(&self) -> &GroupKind {
        &self.group_kind
    }

    pub fn policy(&self) -> &ComparisonPolicy {
        &self.policy
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    /// The one place desired and latest specs are compared.
    pub fn delta(&self, desired: &CustomResource<S>, latest: &CustomResource<S>) -> Result<Delta> {
        self.policy.compare(&desired.spec, &latest.spec)
    }

    /// Whether the controller has taken responsibility for the remote resource.
    pub fn is_managed(&self, resource: &CustomResource<S>) -> bool {
        resource.meta.has_finalizer(&self.finalizer)
    }

    pub fn mark_managed(&self, resource: &mut CustomResource<S>) {
        if !self.is_managed(resource) {
            resource.meta.finalizers.push(self.finalizer.clone());
        }
    }

    pub fn mark_unmanaged(&self, resource: &mut CustomResource<S>) {
        resource.meta.finalizers.retain(|f| f != &self.finalizer);
    }
}

/// The tenant-scoped handles a factory hands to every manager it builds.
#[derive(Clone)]
pub struct ManagerScope {
    pub config: ControllerConfig,
    pub metrics: Metrics,
    pub reconciler: Arc<dyn Reconciler>,
    pub account_id: AccountId,
    pub region: Region,
    /// Where remote calls go: the configured override, else the session's.
    pub endpoint_url: Option<String>,
    pub span: tracing::Span,
}

impl ManagerScope {
    /// Authorizes `session` for the tenant and opens the manager's span.
    pub fn new(
        group_kind: &GroupKind,
        config: ControllerConfig,
        metrics: Metrics,
        reconciler: Arc<dyn Reconciler>,
        session: &Session,
        account_id: AccountId,
        region: Region,
    ) -> Result<Self> {
        session.authorize(&account_id, &region)?;
        let endpoint_url = config
            .endpoint_url
            .clone()
            .or_else(|| session.endpoint_url.clone());
        let span = tracing::info_span!(
            "manager",
            kind = %group_kind,
            account = %account_id,
            region = %region,
            endpoint = endpoint_url.as_deref().unwrap_or("default")
        );
        Ok(Self {
            config,
            metrics,
            reconciler,
            account_id,
            region,
            endpoint_url,
            span,
        })
    }

    /// Runs one remote call bounded by `ctx` and counts it under `operation`.
    ///
    /// The call runs inside the manager's span, so its logs carry the tenant.
    pub async fn call<T, E, F>(&self, ctx: &ReconcileContext, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<ResourceError>,
    {
        let result = ctx
            .run(async { call.await.map_err(Into::into) })
            .instrument(self.span.clone())
            .await;
        self.metrics.record(operation, result.is_ok());
        result
    }
}
