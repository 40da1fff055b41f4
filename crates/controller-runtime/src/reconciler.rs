//! # Reconciler
//!
//! [`ResourceReconciler`] runs one observe-diff-act-confirm pass for one
//! custom resource and reports what it did. It is the only component that
//! turns a [`ResourceError`] into a control-loop decision:
//!
//! | Error kind | Condition set | Requeue |
//! |------------|---------------|---------|
//! | `Unresolved` | `ReferencesResolved=False` | short, fixed interval |
//! | `Transient`, `NotFound` | `Recoverable=True` | exponential backoff |
//! | `Terminal`, `InvariantViolation` | `Terminal=True` | none |
//! | `Cancelled` | unchanged | none |
//!
//! Passes for the same resource must not overlap; the caller serializes them.
//! Passes for different resources may share one reconciler.
//!
//! ## Ownership
//!
//! A CR carries the descriptor's finalizer once the controller is responsible
//! for its remote resource. The finalizer is added *before* `create` so a
//! create that succeeded remotely but whose result was lost is found again
//! by the next pass's `read_one` instead of being created twice. A remote
//! resource found for a CR without the finalizer was not created by this
//! controller and is only taken over when adoption is allowed.
//!
//! ## Scope
//!
//! CRs outside `watch_namespace` are left alone. With the
//! `ReadOnlyResources` feature gate on, a CR annotated
//! `services.k8s.aws/read-only=true` is only observed: its spec and status
//! follow the remote resource and nothing is created, updated, tagged or
//! deleted for it.

use crate::condition::{self, Condition, ConditionKind, ConditionStatus};
use crate::config::ControllerConfig;
use crate::context::ReconcileContext;
use crate::delta::Delta;
use crate::error::{ErrorKind, ResourceError, Result, TransientCause};
use crate::factory::{ResourceDescriptor, ResourceManagerFactory};
use crate::manager::ResourceManager;
use crate::reader::ReferenceReader;
use crate::resource::{CustomResource, ObjectKey, ResourceSpec};
use crate::tags::ServiceControllerMetadata;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Annotation recording that the remote resource was adopted, not created.
pub const ADOPTED_ANNOTATION: &str = "services.k8s.aws/adopted";

/// Feature gate enabling [`READ_ONLY_ANNOTATION`].
pub const READ_ONLY_GATE: &str = "ReadOnlyResources";

/// Annotation asking the controller to observe a remote resource without managing it.
pub const READ_ONLY_ANNOTATION: &str = "services.k8s.aws/read-only";

/// The mutation a pass performed on the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    None,
    Created,
    Adopted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    None,
    After(Duration),
}

#[derive(Debug)]
pub struct ReconcileOutcome<S: ResourceSpec> {
    /// The CR to persist: status, conditions, finalizers and late-initialized spec.
    pub resource: CustomResource<S>,
    pub action: ReconcileAction,
    pub requeue: Requeue,
    pub error: Option<ResourceError>,
}

impl<S: ResourceSpec> ReconcileOutcome<S> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Deletion finished; the CR itself can go away.
    pub fn is_finalized(&self) -> bool {
        self.resource.is_being_deleted() && self.error.is_none()
    }
}

/// Exponential backoff for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_backoff_seconds),
            Duration::from_secs(config.max_backoff_seconds),
        )
    }

    /// Delay before the retry following the `failures`-th consecutive failure.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial.saturating_mul(1 << exponent).min(self.max)
    }
}

pub struct ResourceReconciler<M: ResourceManager> {
    manager: Arc<M>,
    descriptor: ResourceDescriptor<M::Spec>,
    reader: Arc<dyn ReferenceReader>,
    metadata: ServiceControllerMetadata,
    config: ControllerConfig,
    adoptable: bool,
    requeue_on_success: u64,
    backoff: Backoff,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl<M: ResourceManager> ResourceReconciler<M> {
    pub fn new<F>(
        factory: &F,
        manager: Arc<M>,
        reader: Arc<dyn ReferenceReader>,
        metadata: ServiceControllerMetadata,
        config: ControllerConfig,
    ) -> Self
    where
        F: ResourceManagerFactory<Manager = M>,
    {
        Self {
            manager,
            descriptor: factory.descriptor(),
            reader,
            metadata,
            backoff: Backoff::from_config(&config),
            config,
            adoptable: factory.is_adoptable(),
            requeue_on_success: factory.requeue_on_success_seconds(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    pub fn descriptor(&self) -> &ResourceDescriptor<M::Spec> {
        &self.descriptor
    }

    /// Runs one pass over `resource`.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        resource: CustomResource<M::Spec>,
    ) -> ReconcileOutcome<M::Spec> {
        let span = info_span!(
            "reconcile",
            kind = %self.descriptor.group_kind().kind,
            key = %resource.key()
        );
        if !self.config.watches(&resource.meta.namespace) {
            span.in_scope(|| debug!("Namespace not watched, skipping"));
            return ReconcileOutcome {
                resource,
                action: ReconcileAction::None,
                requeue: Requeue::None,
                error: None,
            };
        }
        self.run_pass(ctx, resource).instrument(span).await
    }

    fn is_read_only(&self, resource: &CustomResource<M::Spec>) -> bool {
        self.config.feature_enabled(READ_ONLY_GATE)
            && resource.annotation(READ_ONLY_ANNOTATION) == Some("true")
    }

    async fn run_pass(
        &self,
        ctx: &ReconcileContext,
        mut resource: CustomResource<M::Spec>,
    ) -> ReconcileOutcome<M::Spec> {
        debug!(?resource, "Reconcile");
        let key = resource.key();
        let mut action = ReconcileAction::None;

        let result = if self.is_read_only(&resource) {
            self.observe(ctx, &mut resource).await
        } else if resource.is_being_deleted() {
            self.finalize(ctx, &mut resource, &mut action).await
        } else {
            self.sync(ctx, &mut resource, &mut action).await
        };

        match result {
            Ok(requeue) => {
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
                ReconcileOutcome {
                    resource,
                    action,
                    requeue,
                    error: None,
                }
            }
            Err(error) => {
                let requeue = self.handle_error(&key, &mut resource, &error);
                ReconcileOutcome {
                    resource,
                    action,
                    requeue,
                    error: Some(error),
                }
            }
        }
    }

    async fn sync(
        &self,
        ctx: &ReconcileContext,
        desired: &mut CustomResource<M::Spec>,
        action: &mut ReconcileAction,
    ) -> Result<Requeue> {
        ctx.check()?;

        let resolved = match self
            .manager
            .resolve_references(ctx, self.reader.as_ref(), desired)
            .await
        {
            Ok(resolved) => {
                desired.set_condition(Condition::new(
                    ConditionKind::ReferencesResolved,
                    ConditionStatus::True,
                ));
                resolved
            }
            Err(e) => {
                desired.set_condition(
                    Condition::new(ConditionKind::ReferencesResolved, ConditionStatus::False)
                        .with_reason(reason(&e))
                        .with_message(e.to_string()),
                );
                return Err(e);
            }
        };

        let latest = match self.manager.read_one(ctx, &resolved).await {
            Ok(latest) => {
                if !self.descriptor.is_managed(desired) {
                    self.adopt(desired)?;
                    *action = ReconcileAction::Adopted;
                    info!("Adopted");
                }
                let delta = self.descriptor.delta(&resolved, &latest)?;
                if delta.is_empty() {
                    debug!(ignored = delta.ignored().len(), "In sync");
                    latest
                } else {
                    info!(fields = %describe(&delta), "Updating");
                    let updated = self.manager.update(ctx, &resolved, &latest, &delta).await?;
                    if *action == ReconcileAction::None {
                        *action = ReconcileAction::Updated;
                    }
                    updated
                }
            }
            Err(e) if e.is_not_found() => {
                self.descriptor.mark_managed(desired);
                let created = self.manager.create(ctx, &resolved).await?;
                *action = ReconcileAction::Created;
                info!(identifiers = ?created.identifiers(), "Created");
                created
            }
            Err(e) => return Err(e),
        };

        desired.absorb_status(&latest);

        let initialized = self.manager.late_initialize(ctx, desired).await?;
        if initialized.spec != desired.spec {
            debug!(spec = ?initialized.spec, "Late initialized");
            desired.spec = initialized.spec;
        }
        desired.set_condition(Condition::new(
            ConditionKind::LateInitialized,
            ConditionStatus::True,
        ));

        self.manager.ensure_tags(ctx, desired, &self.metadata).await?;

        self.confirm(ctx, desired, *action).await
    }

    /// Mirrors the remote resource into a read-only CR.
    async fn observe(
        &self,
        ctx: &ReconcileContext,
        desired: &mut CustomResource<M::Spec>,
    ) -> Result<Requeue> {
        if desired.is_being_deleted() {
            // The remote resource is not ours to delete.
            self.descriptor.mark_unmanaged(desired);
            return Ok(Requeue::None);
        }
        ctx.check()?;
        let resolved = self
            .manager
            .resolve_references(ctx, self.reader.as_ref(), desired)
            .await?;
        let latest = self.manager.read_one(ctx, &resolved).await?;
        debug!("Observed read-only resource");
        desired.spec = latest.spec.clone();
        desired.absorb_status(&latest);
        self.confirm(ctx, desired, ReconcileAction::None).await
    }

    /// Clears failure conditions and records whether the resource has converged.
    async fn confirm(
        &self,
        ctx: &ReconcileContext,
        desired: &mut CustomResource<M::Spec>,
        action: ReconcileAction,
    ) -> Result<Requeue> {
        condition::remove(&mut desired.status.conditions, ConditionKind::Recoverable);
        condition::remove(&mut desired.status.conditions, ConditionKind::Terminal);

        if self.manager.is_synced(ctx, desired).await? {
            desired.set_condition(Condition::new(
                ConditionKind::ResourceSynced,
                ConditionStatus::True,
            ));
            let requeue = match self.requeue_on_success {
                0 => Requeue::None,
                secs => Requeue::After(Duration::from_secs(secs)),
            };
            info!(?action, ?requeue, "Synced");
            Ok(requeue)
        } else {
            desired.set_condition(
                Condition::new(ConditionKind::ResourceSynced, ConditionStatus::False)
                    .with_reason("Pending")
                    .with_message("remote resource is still converging"),
            );
            info!(?action, "Not synced yet");
            Ok(Requeue::After(self.config.requeue_unresolved()))
        }
    }

    async fn finalize(
        &self,
        ctx: &ReconcileContext,
        desired: &mut CustomResource<M::Spec>,
        action: &mut ReconcileAction,
    ) -> Result<Requeue> {
        if !self.descriptor.is_managed(desired) {
            debug!("Not managed, nothing to delete");
            return Ok(Requeue::None);
        }
        ctx.check()?;
        match self.manager.read_one(ctx, desired).await {
            Ok(latest) => {
                self.manager.delete(ctx, &latest).await?;
                *action = ReconcileAction::Deleted;
                info!("Deleted");
            }
            Err(e) if e.is_not_found() => debug!("Already gone"),
            Err(e) => return Err(e),
        }
        self.descriptor.mark_unmanaged(desired);
        Ok(Requeue::None)
    }

    fn adopt(&self, desired: &mut CustomResource<M::Spec>) -> Result<()> {
        if !self.adoptable {
            return Err(ResourceError::terminal(format!(
                "{} already exists and {} resources cannot be adopted",
                desired.key(),
                self.descriptor.group_kind()
            )));
        }
        if !self.config.enable_adoption {
            return Err(ResourceError::terminal(format!(
                "{} already exists and adoption is disabled",
                desired.key()
            )));
        }
        self.descriptor.mark_managed(desired);
        desired
            .meta
            .annotations
            .insert(ADOPTED_ANNOTATION.to_string(), "true".to_string());
        Ok(())
    }

    fn handle_error(
        &self,
        key: &ObjectKey,
        resource: &mut CustomResource<M::Spec>,
        error: &ResourceError,
    ) -> Requeue {
        let not_synced = |reason: &str| {
            Condition::new(ConditionKind::ResourceSynced, ConditionStatus::False).with_reason(reason)
        };

        if error.kind() != ErrorKind::Cancelled {
            condition::remove(&mut resource.status.conditions, ConditionKind::Recoverable);
            condition::remove(&mut resource.status.conditions, ConditionKind::Terminal);
        }

        match error.kind() {
            ErrorKind::Cancelled => {
                debug!("Pass cancelled");
                Requeue::None
            }
            ErrorKind::Unresolved => {
                info!(%error, "Waiting for references");
                resource.set_condition(not_synced("ReferencesUnresolved"));
                Requeue::After(self.config.requeue_unresolved())
            }
            ErrorKind::Transient | ErrorKind::NotFound => {
                if let ResourceError::Transient(TransientCause::RequeueAfter(after)) = error {
                    debug!(?after, "Requeue requested");
                    return Requeue::After(*after);
                }
                let failures = {
                    let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
                    let count = failures.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                let delay = self.backoff.delay(failures);
                warn!(%error, failures, ?delay, "Pass failed, will retry");
                resource.set_condition(
                    Condition::new(ConditionKind::Recoverable, ConditionStatus::True)
                        .with_reason(reason(error))
                        .with_message(error.to_string()),
                );
                resource.set_condition(not_synced("Recoverable"));
                Requeue::After(delay)
            }
            ErrorKind::Terminal | ErrorKind::InvariantViolation => {
                if error.kind() == ErrorKind::InvariantViolation {
                    error!(%error, "Invariant violated by resource manager");
                } else {
                    warn!(%error, "Terminal failure");
                }
                resource.set_condition(
                    Condition::new(ConditionKind::Terminal, ConditionStatus::True)
                        .with_reason(reason(error))
                        .with_message(error.to_string()),
                );
                resource.set_condition(not_synced("Terminal"));
                Requeue::None
            }
        }
    }
}

fn reason(error: &ResourceError) -> &'static str {
    match error.kind() {
        ErrorKind::NotFound => "NotFound",
        ErrorKind::Transient => "Transient",
        ErrorKind::Unresolved => "Unresolved",
        ErrorKind::Terminal => "Terminal",
        ErrorKind::InvariantViolation => "InvariantViolation",
        ErrorKind::Cancelled => "Cancelled",
    }
}

fn describe(delta: &Delta) -> String {
    delta
        .paths()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(4), Duration::from_secs(8));
        assert_eq!(backoff.delay(5), Duration::from_secs(10));
        assert_eq!(backoff.delay(200), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_from_config() {
        let config = ControllerConfig::default();
        let backoff = Backoff::from_config(&config);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(300));
    }
}
