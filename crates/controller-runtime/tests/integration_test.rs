use controller_runtime::mock::{MockFactory, MockResourceManager, Operation};
use controller_runtime::reconciler::{ADOPTED_ANNOTATION, READ_ONLY_ANNOTATION, READ_ONLY_GATE};
use controller_runtime::{
    condition, ComparisonPolicy, ConditionKind, ControllerConfig, CustomResource, Delta,
    ErrorKind, FieldPath, GroupKind, InMemoryReader, ObjectMeta, ReconcileAction,
    ReconcileContext, Requeue, ResourceError, ResourceManagerFactory, ResourceName,
    ResourceReconciler, ResourceSpec, ServiceControllerMetadata, TransientCause,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// --- Test Resource ---

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct VolumeStatus {
    state: Option<String>,
}

impl ResourceSpec for Volume {
    type Status = VolumeStatus;

    fn group_kind() -> GroupKind {
        GroupKind::new("storage.services.k8s.aws", "Volume")
    }
}

// Encryption is server-assigned and deliberately not comparable.
fn policy() -> ComparisonPolicy {
    ComparisonPolicy::new().field("size")
}

fn volume(size: u32) -> CustomResource<Volume> {
    CustomResource::new(
        ObjectMeta::new("default", "vol-a"),
        Volume {
            size: Some(size),
            encryption: None,
        },
    )
}

fn with_arn(mut resource: CustomResource<Volume>) -> CustomResource<Volume> {
    resource.status.identifiers.arn =
        Some("arn:aws:storage:us-east-1:111122223333:volume/vol-a".parse().unwrap());
    resource
}

struct Harness {
    mock: MockResourceManager<Volume>,
    reconciler: ResourceReconciler<MockResourceManager<Volume>>,
}

fn harness_with(factory: MockFactory<Volume>, config: ControllerConfig) -> Harness {
    let mock = factory_mock(&factory);
    let reconciler = ResourceReconciler::new(
        &factory,
        Arc::new(mock.clone()),
        Arc::new(InMemoryReader::new()),
        ServiceControllerMetadata::new("storage", "0.1.0"),
        config,
    );
    Harness { mock, reconciler }
}

fn factory_mock(factory: &MockFactory<Volume>) -> MockResourceManager<Volume> {
    use controller_runtime::{Credentials, Metrics, SecretStore, Session};
    let session = Session::new("111".into(), "us-east-1".into(), Credentials::new("AK", "SK"));
    factory
        .manager_for(
            ControllerConfig::default(),
            Metrics::new(),
            Arc::new(SecretStore::new()),
            &session,
            "111".into(),
            "us-east-1".into(),
        )
        .unwrap()
}

fn harness() -> Harness {
    harness_with(
        MockFactory::new(MockResourceManager::new(), policy()),
        ControllerConfig::default(),
    )
}

impl Harness {
    fn managed(&self, mut resource: CustomResource<Volume>) -> CustomResource<Volume> {
        self.reconciler.descriptor().mark_managed(&mut resource);
        resource
    }

    fn expect_converge(&self, synced: bool) {
        self.mock.expect_late_initialize().return_input();
        self.mock.expect_ensure_tags().return_ok();
        self.mock.expect_is_synced().return_ok(synced);
    }
}

// --- Scenarios ---

#[tokio::test]
async fn test_absent_remote_is_created_with_arn() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock
        .expect_read_one()
        .return_err(ResourceError::not_found("vol-a"));
    h.mock.expect_create().return_ok(with_arn(volume(10)));
    h.expect_converge(true);

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::Created);
    assert!(outcome.resource.identifiers().arn.is_some());
    assert!(h.reconciler.descriptor().is_managed(&outcome.resource));
    assert!(condition::is_synced(outcome.resource.conditions()));
    assert_eq!(outcome.requeue, Requeue::None);
    assert_eq!(
        h.mock.calls(),
        vec![
            Operation::ResolveReferences,
            Operation::ReadOne,
            Operation::Create,
            Operation::LateInitialize,
            Operation::EnsureTags,
            Operation::IsSynced,
        ]
    );
    h.mock.verify();
}

#[tokio::test]
async fn test_server_default_only_difference_skips_update() {
    let h = harness();
    let ctx = ReconcileContext::new();

    let mut latest = with_arn(volume(10));
    latest.spec.encryption = Some("AES256".into());

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(latest);
    h.expect_converge(true);

    let outcome = h.reconciler.reconcile(&ctx, h.managed(volume(10))).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.action, ReconcileAction::None);
    assert!(!h.mock.was_called(Operation::Update));
    h.mock.verify();
}

#[tokio::test]
async fn test_changed_size_updates_with_exact_delta() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.mock.expect_update().return_ok(with_arn(volume(20)));
    h.expect_converge(true);

    let outcome = h.reconciler.reconcile(&ctx, h.managed(volume(20))).await;

    assert_eq!(outcome.action, ReconcileAction::Updated);
    let deltas = h.mock.update_deltas();
    assert_eq!(deltas.len(), 1);
    let delta: &Delta = &deltas[0];
    assert_eq!(delta.len(), 1);
    let difference = &delta.differences()[0];
    assert_eq!(difference.path, FieldPath::from("size"));
    assert_eq!(difference.latest, Some(json!(10)));
    assert_eq!(difference.desired, Some(json!(20)));
    h.mock.verify();
}

#[tokio::test]
async fn test_unresolved_reference_requeues_without_create() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock
        .expect_resolve_references()
        .return_err(ResourceError::unresolved("default/vpc-x", "not synced"));

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert_eq!(outcome.error.as_ref().map(ResourceError::kind), Some(ErrorKind::Unresolved));
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(5)));
    assert!(!h.mock.was_called(Operation::ReadOne));
    assert!(!h.mock.was_called(Operation::Create));
    let resolved =
        condition::find(outcome.resource.conditions(), ConditionKind::ReferencesResolved).unwrap();
    assert!(!resolved.is_true());
    assert!(condition::find(outcome.resource.conditions(), ConditionKind::Terminal).is_none());
    h.mock.verify();
}

#[tokio::test]
async fn test_not_synced_requeues_then_synced_settles() {
    let h = harness_with(
        MockFactory::new(MockResourceManager::new(), policy()).requeue_on_success(600),
        ControllerConfig::default(),
    );
    let ctx = ReconcileContext::new();
    let desired = h.managed(with_arn(volume(10)));

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.expect_converge(false);
    let first = h.reconciler.reconcile(&ctx, desired).await;
    assert!(first.is_ok());
    assert!(!condition::is_synced(first.resource.conditions()));
    assert_eq!(first.requeue, Requeue::After(Duration::from_secs(5)));

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.expect_converge(true);
    let second = h.reconciler.reconcile(&ctx, first.resource).await;
    assert!(condition::is_synced(second.resource.conditions()));
    assert_eq!(second.requeue, Requeue::After(Duration::from_secs(600)));
    h.mock.verify();
}

// --- Deletion ---

#[tokio::test]
async fn test_delete_of_absent_resource_succeeds() {
    let h = harness();
    let ctx = ReconcileContext::new();
    let mut doomed = h.managed(with_arn(volume(10)));
    doomed.meta.deletion_requested = true;

    h.mock
        .expect_read_one()
        .return_err(ResourceError::not_found("vol-a"));

    let outcome = h.reconciler.reconcile(&ctx, doomed).await;

    assert!(outcome.is_finalized());
    assert_eq!(outcome.action, ReconcileAction::None);
    assert!(!h.reconciler.descriptor().is_managed(&outcome.resource));
    assert!(!h.mock.was_called(Operation::Delete));
    h.mock.verify();
}

#[tokio::test]
async fn test_delete_removes_remote_then_finalizer() {
    let h = harness();
    let ctx = ReconcileContext::new();
    let mut doomed = h.managed(with_arn(volume(10)));
    doomed.meta.deletion_requested = true;

    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.mock.expect_delete().return_input();

    let outcome = h.reconciler.reconcile(&ctx, doomed).await;

    assert!(outcome.is_finalized());
    assert_eq!(outcome.action, ReconcileAction::Deleted);
    assert!(outcome.resource.meta.finalizers.is_empty());
    h.mock.verify();
}

#[tokio::test]
async fn test_unmanaged_deletion_never_touches_remote() {
    let h = harness();
    let ctx = ReconcileContext::new();
    let mut doomed = volume(10);
    doomed.meta.deletion_requested = true;

    let outcome = h.reconciler.reconcile(&ctx, doomed).await;

    assert!(outcome.is_finalized());
    assert!(h.mock.calls().is_empty());
}

// --- Adoption ---

#[tokio::test]
async fn test_existing_remote_without_adoption_is_terminal() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert_eq!(outcome.error.as_ref().map(ResourceError::kind), Some(ErrorKind::Terminal));
    assert_eq!(outcome.requeue, Requeue::None);
    assert!(condition::find(outcome.resource.conditions(), ConditionKind::Terminal)
        .is_some_and(|c| c.is_true()));
    assert!(!h.reconciler.descriptor().is_managed(&outcome.resource));
    h.mock.verify();
}

#[tokio::test]
async fn test_adoptable_type_takes_over_existing_remote() {
    let config = ControllerConfig {
        enable_adoption: true,
        ..ControllerConfig::default()
    };
    let h = harness_with(
        MockFactory::new(MockResourceManager::new(), policy()).adoptable(true),
        config,
    );
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.expect_converge(true);

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.action, ReconcileAction::Adopted);
    assert_eq!(outcome.resource.annotation(ADOPTED_ANNOTATION), Some("true"));
    assert!(h.reconciler.descriptor().is_managed(&outcome.resource));
    h.mock.verify();
}

// --- Error mapping ---

#[tokio::test]
async fn test_transient_failures_back_off_then_recover() {
    let h = harness();
    let ctx = ReconcileContext::new();
    let desired = h.managed(with_arn(volume(10)));
    let throttled = || ResourceError::Transient(TransientCause::Throttled);

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_err(throttled());
    let first = h.reconciler.reconcile(&ctx, desired).await;
    assert_eq!(first.requeue, Requeue::After(Duration::from_secs(1)));
    assert!(condition::find(first.resource.conditions(), ConditionKind::Recoverable)
        .is_some_and(|c| c.is_true()));

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_err(throttled());
    let second = h.reconciler.reconcile(&ctx, first.resource).await;
    assert_eq!(second.requeue, Requeue::After(Duration::from_secs(2)));

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.expect_converge(true);
    let third = h.reconciler.reconcile(&ctx, second.resource).await;
    assert!(third.is_ok());
    assert!(condition::find(third.resource.conditions(), ConditionKind::Recoverable).is_none());
    assert!(condition::is_synced(third.resource.conditions()));
    h.mock.verify();
}

#[tokio::test]
async fn test_invariant_violation_is_terminal() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.mock
        .expect_update()
        .return_err(ResourceError::invariant("size cannot change in place"));

    let outcome = h.reconciler.reconcile(&ctx, h.managed(volume(20))).await;

    assert_eq!(
        outcome.error.as_ref().map(ResourceError::kind),
        Some(ErrorKind::InvariantViolation)
    );
    assert_eq!(outcome.requeue, Requeue::None);
    assert!(condition::find(outcome.resource.conditions(), ConditionKind::Terminal).is_some());
    h.mock.verify();
}

#[tokio::test]
async fn test_cancelled_pass_calls_nothing() {
    let h = harness();
    let ctx = ReconcileContext::new();
    ctx.cancel();

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert_eq!(outcome.error.as_ref().map(ResourceError::kind), Some(ErrorKind::Cancelled));
    assert_eq!(outcome.requeue, Requeue::None);
    assert!(h.mock.calls().is_empty());
}

#[tokio::test]
async fn test_requeue_after_is_honoured_without_backoff() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock
        .expect_read_one()
        .return_err(ResourceError::requeue_after(Duration::from_secs(42)));

    let outcome = h.reconciler.reconcile(&ctx, h.managed(volume(10))).await;
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(42)));
    h.mock.verify();
}

#[tokio::test]
async fn test_unwatched_namespace_is_skipped() {
    let config = ControllerConfig {
        watch_namespace: Some("storage".to_string()),
        ..ControllerConfig::default()
    };
    let h = harness_with(MockFactory::new(MockResourceManager::new(), policy()), config);
    let ctx = ReconcileContext::new();

    let outcome = h.reconciler.reconcile(&ctx, volume(10)).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.action, ReconcileAction::None);
    assert_eq!(outcome.requeue, Requeue::None);
    assert!(outcome.resource.conditions().is_empty());
    assert!(h.mock.calls().is_empty());
}

fn read_only_harness() -> Harness {
    let mut config = ControllerConfig::default();
    config.feature_gates.insert(READ_ONLY_GATE.to_string(), true);
    harness_with(MockFactory::new(MockResourceManager::new(), policy()), config)
}

fn read_only(size: u32) -> CustomResource<Volume> {
    let mut resource = volume(size);
    resource
        .meta
        .annotations
        .insert(READ_ONLY_ANNOTATION.to_string(), "true".to_string());
    resource
}

#[tokio::test]
async fn test_read_only_resource_is_observed_not_changed() {
    let h = read_only_harness();
    let ctx = ReconcileContext::new();

    let mut latest = with_arn(volume(10));
    latest.status.fields.state = Some("in-use".to_string());
    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(latest);
    h.mock.expect_is_synced().return_ok(true);

    let outcome = h.reconciler.reconcile(&ctx, read_only(20)).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::None);
    assert_eq!(outcome.resource.spec.size, Some(10));
    assert_eq!(outcome.resource.status.fields.state.as_deref(), Some("in-use"));
    assert!(!h.reconciler.descriptor().is_managed(&outcome.resource));
    assert_eq!(
        h.mock.calls(),
        vec![
            Operation::ResolveReferences,
            Operation::ReadOne,
            Operation::IsSynced,
        ]
    );
    h.mock.verify();

    let mut deleted = outcome.resource;
    deleted.meta.deletion_requested = true;
    let gone = h.reconciler.reconcile(&ctx, deleted).await;
    assert!(gone.is_finalized());
    assert!(!h.mock.was_called(Operation::Delete));
}

#[tokio::test]
async fn test_read_only_annotation_needs_feature_gate() {
    let h = harness();
    let ctx = ReconcileContext::new();

    h.mock.expect_resolve_references().return_input();
    h.mock.expect_read_one().return_ok(with_arn(volume(10)));
    h.mock.expect_update().return_ok(with_arn(volume(20)));
    h.expect_converge(true);

    let outcome = h.reconciler.reconcile(&ctx, h.managed(read_only(20))).await;

    assert_eq!(outcome.action, ReconcileAction::Updated);
    h.mock.verify();
}

#[test]
fn test_mock_arn_rule() {
    use controller_runtime::ResourceManager;
    let mock = MockResourceManager::<Volume>::new().with_arn_rule(|name| {
        Some(ResourceName::build("aws", "storage", "", "", name))
    });
    assert_eq!(
        mock.arn_from_name("vol-a").map(|arn| arn.to_string()),
        Some("arn:aws:storage:::vol-a".to_string())
    );
    assert!(MockResourceManager::<Volume>::new().arn_from_name("vol-a").is_none());
}
