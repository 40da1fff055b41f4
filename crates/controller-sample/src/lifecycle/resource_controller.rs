use controller_runtime::condition;
use controller_runtime::{
    CustomResource, InMemoryReader, ReconcileContext, ReconcileOutcome, Requeue,
    ResourceManager, ResourceManagerFactory, ResourceReconciler, ResourceSpec, SyncState,
    TenantRegistry,
};
use std::sync::Arc;
use tracing::debug;

type SpecOf<F> = <<F as ResourceManagerFactory>::Manager as ResourceManager>::Spec;

/// Reconciles one resource type in the controller's home tenant.
///
/// Every pass goes through the manager the registry built for the configured
/// account and region. The registry can hand out managers for other tenants,
/// but CRs carry no account or region of their own, so nothing is routed to
/// them.
///
/// After every pass the resulting CR is published to the shared reader, the
/// way a real controller's status write becomes visible to other
/// controllers through the API server.
pub struct ResourceController<F: ResourceManagerFactory> {
    managers: TenantRegistry<F>,
    reconciler: ResourceReconciler<F::Manager>,
    reader: InMemoryReader,
}

impl<F: ResourceManagerFactory> ResourceController<F> {
    pub fn new(
        managers: TenantRegistry<F>,
        reconciler: ResourceReconciler<F::Manager>,
        reader: InMemoryReader,
    ) -> Self {
        Self {
            managers,
            reconciler,
            reader,
        }
    }

    pub fn manager(&self) -> &Arc<F::Manager> {
        self.reconciler.manager()
    }

    pub fn managers(&self) -> &TenantRegistry<F> {
        &self.managers
    }

    pub fn reconciler(&self) -> &ResourceReconciler<F::Manager> {
        &self.reconciler
    }

    pub async fn reconcile(
        &self,
        resource: CustomResource<SpecOf<F>>,
    ) -> ReconcileOutcome<SpecOf<F>> {
        self.reconcile_with(&ReconcileContext::new(), resource).await
    }

    /// Runs one pass under `ctx` and publishes the outcome.
    pub async fn reconcile_with(
        &self,
        ctx: &ReconcileContext,
        resource: CustomResource<SpecOf<F>>,
    ) -> ReconcileOutcome<SpecOf<F>> {
        let outcome = self.reconciler.reconcile(ctx, resource).await;
        if outcome.is_finalized() {
            self.reader
                .remove(&<SpecOf<F> as ResourceSpec>::group_kind(), &outcome.resource.key());
        } else {
            self.reader.publish(&outcome.resource);
        }
        outcome
    }

    /// Reconciles, sleeping through each requeue, until the resource leaves
    /// [`SyncState::Pending`], a pass asks for no requeue, or `max_passes`
    /// passes have run.
    pub async fn converge(
        &self,
        mut resource: CustomResource<SpecOf<F>>,
        max_passes: usize,
    ) -> ReconcileOutcome<SpecOf<F>> {
        let mut passes = 1;
        let mut state = SyncState::default();
        loop {
            let outcome = self.reconcile(resource).await;
            state = match &outcome.error {
                None => state.observe(Ok(condition::is_synced(outcome.resource.conditions()))),
                Some(e) => state.observe(Err(e)),
            };
            match outcome.requeue {
                Requeue::After(delay) if state == SyncState::Pending && passes < max_passes => {
                    debug!(passes, ?delay, ?state, "Requeued");
                    tokio::time::sleep(delay).await;
                    passes += 1;
                    resource = outcome.resource;
                }
                _ => return outcome,
            }
        }
    }
}
