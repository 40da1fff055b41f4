use controller_runtime::reconciler::ADOPTED_ANNOTATION;
use controller_runtime::{
    condition, ConditionKind, ConditionStatus, ControllerConfig, Credentials, ErrorKind,
    Insignificance, ObjectKey, ObjectMeta, ReconcileAction, ReconcileContext, Requeue,
    ResourceIdentifiers, ResourceManager, SecretKeyReference, Session,
};
use controller_sample::lifecycle::ControllerSystem;
use controller_sample::model::{
    bucket_arn, Bucket, BucketCreate, BucketSpec, ResourceRef, Subnet, SubnetCreate, SubnetSpec,
    Vpc, VpcCreate, VpcId, VpcSpec, NAME_TAG,
};
use std::collections::BTreeMap;
use std::time::Duration;

const CONFIG: &str = r#"
account_id = "111122223333"
region = "us-west-2"
enable_adoption = true
resource_tags = ["services.k8s.aws/namespace=%K8S_NAMESPACE%"]
"#;

fn start(raw: &str, delay: Duration) -> ControllerSystem {
    let config = ControllerConfig::from_toml_str(raw).unwrap();
    let session = Session::new(
        config.account_id.clone(),
        config.region.clone(),
        Credentials::new("AKIDEXAMPLE", "secret"),
    );
    ControllerSystem::with_provisioning_delay(config, &session, delay).unwrap()
}

fn bucket(name: &str) -> Bucket {
    Bucket::new(
        ObjectMeta::new("infra", "assets"),
        BucketSpec {
            name: name.to_string(),
            ..BucketSpec::default()
        },
    )
}

fn vpc(name: &str) -> Vpc {
    Vpc::new(
        ObjectMeta::new("infra", name),
        VpcSpec {
            cidr_block: "10.0.0.0/16".to_string(),
            ..VpcSpec::default()
        },
    )
}

fn subnet_of(vpc_name: &str) -> Subnet {
    Subnet::new(
        ObjectMeta::new("infra", "private-a"),
        SubnetSpec {
            cidr_block: "10.0.1.0/24".to_string(),
            vpc_ref: Some(ResourceRef::new(vpc_name)),
            ..SubnetSpec::default()
        },
    )
}

fn condition_status(
    conditions: &[controller_runtime::Condition],
    kind: ConditionKind,
) -> Option<ConditionStatus> {
    condition::find(conditions, kind).map(|c| c.status)
}

/// The `Name` tag the controllers give a CR called `name` in `infra`.
fn named(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_TAG.to_string(), format!("infra/{name}"))])
}

#[tokio::test]
async fn test_absent_bucket_is_created_with_arn() {
    let system = start(CONFIG, Duration::ZERO);

    let outcome = system.buckets.reconcile(bucket("bucket-a")).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::Created);
    assert_eq!(outcome.resource.identifiers().arn, Some(bucket_arn("bucket-a")));
    assert_eq!(outcome.requeue, Requeue::None);
    assert!(condition::is_synced(outcome.resource.conditions()));
    let finalizer = system.buckets.reconciler().descriptor().finalizer().to_string();
    assert!(outcome.resource.meta.has_finalizer(&finalizer));
    assert_eq!(
        outcome.resource.status.fields.location.as_deref(),
        Some("us-west-2")
    );

    assert_eq!(system.metrics.get("HeadBucket").errors, 1);
    assert_eq!(system.metrics.get("CreateBucket").calls, 1);
    assert!(system.bucket_service.describe("bucket-a".to_string()).await.is_ok());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_default_is_not_drift() {
    let system = start(CONFIG, Duration::ZERO);
    let created = system.buckets.reconcile(bucket("bucket-a")).await.resource;

    // The user never set encryption; the service chose one.
    let mut desired = created;
    desired.spec.encryption = None;

    let ctx = ReconcileContext::new();
    let latest = system.buckets.manager().read_one(&ctx, &desired).await.unwrap();
    let delta = system
        .buckets
        .reconciler()
        .descriptor()
        .delta(&desired, &latest)
        .unwrap();
    assert!(delta.is_empty());
    assert!(delta
        .ignored()
        .iter()
        .any(|(d, reason)| d.path.to_string() == "encryption"
            && *reason == Insignificance::ServerDefault));

    let outcome = system.buckets.reconcile(desired).await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.action, ReconcileAction::None);
    assert_eq!(outcome.resource.spec.encryption.as_deref(), Some("AES256"));
    assert_eq!(system.metrics.get("PutBucketConfiguration").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_changed_field_is_updated_alone() {
    let system = start(CONFIG, Duration::ZERO);
    let mut desired = system.buckets.reconcile(bucket("bucket-a")).await.resource;
    assert_eq!(desired.spec.versioning, Some(false));

    desired.spec.versioning = Some(true);
    let ctx = ReconcileContext::new();
    let latest = system.buckets.manager().read_one(&ctx, &desired).await.unwrap();
    let delta = system
        .buckets
        .reconciler()
        .descriptor()
        .delta(&desired, &latest)
        .unwrap();
    assert_eq!(delta.len(), 1);
    assert!(delta.different_at("versioning"));

    let outcome = system.buckets.reconcile(desired).await;
    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::Updated);
    assert_eq!(system.metrics.get("PutBucketConfiguration").calls, 1);

    let record = system
        .bucket_service
        .describe("bucket-a".to_string())
        .await
        .unwrap();
    assert!(record.versioning);
    assert_eq!(record.encryption, "AES256");

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reordered_origins_are_not_drift() {
    let system = start(CONFIG, Duration::ZERO);
    let mut desired = bucket("bucket-a");
    desired.spec.cors_allowed_origins =
        vec!["https://b.example.com".into(), "https://a.example.com".into()];

    let created = system.buckets.reconcile(desired).await;
    assert_eq!(created.action, ReconcileAction::Created);
    let again = system.buckets.reconcile(created.resource).await;

    assert_eq!(again.action, ReconcileAction::None);
    assert_eq!(system.metrics.get("PutBucketConfiguration").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clearing_origins_is_updated() {
    let system = start(CONFIG, Duration::ZERO);
    let mut desired = bucket("bucket-a");
    desired.spec.cors_allowed_origins = vec!["https://a.example.com".into()];
    let mut created = system.buckets.reconcile(desired).await.resource;

    created.spec.cors_allowed_origins.clear();
    let cleared = system.buckets.reconcile(created).await;

    assert!(cleared.is_ok(), "{:?}", cleared.error);
    assert_eq!(cleared.action, ReconcileAction::Updated);
    assert_eq!(system.metrics.get("PutBucketConfiguration").calls, 1);
    let record = system
        .bucket_service
        .describe("bucket-a".to_string())
        .await
        .unwrap();
    assert!(record.cors_allowed_origins.is_empty());

    let again = system.buckets.reconcile(cleared.resource).await;
    assert_eq!(again.action, ReconcileAction::None);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_customer_key_is_read_from_secret() {
    let system = start(CONFIG, Duration::ZERO);
    let mut desired = bucket("bucket-a");
    desired.spec.customer_key = Some(SecretKeyReference::new("bucket-keys", "sse-c"));

    let missing = system.buckets.reconcile(desired).await;
    assert_eq!(missing.error.as_ref().unwrap().kind(), ErrorKind::NotFound);
    assert_eq!(missing.requeue, Requeue::After(Duration::from_secs(1)));
    assert_eq!(system.metrics.get("CreateBucket").calls, 0);

    system.secrets.insert(
        ObjectKey::new("infra", "bucket-keys"),
        BTreeMap::from([("sse-c".to_string(), "k".repeat(32))]),
    );
    let created = system.buckets.reconcile(missing.resource).await;

    assert!(created.is_ok(), "{:?}", created.error);
    assert_eq!(created.action, ReconcileAction::Created);
    let record = system
        .bucket_service
        .describe("bucket-a".to_string())
        .await
        .unwrap();
    assert!(record.has_customer_key);

    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reference_to_provisioning_vpc_waits_without_create() {
    let system = start(CONFIG, Duration::from_secs(30));

    let pending = system.vpcs.reconcile(vpc("vpc-x")).await;
    assert!(pending.is_ok());
    assert_eq!(pending.action, ReconcileAction::Created);
    assert!(!condition::is_synced(pending.resource.conditions()));

    let waiting = system.subnets.reconcile(subnet_of("vpc-x")).await;
    let error = waiting.error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::Unresolved);
    assert_eq!(waiting.requeue, Requeue::After(Duration::from_secs(5)));
    assert_eq!(waiting.action, ReconcileAction::None);
    assert_eq!(
        condition_status(waiting.resource.conditions(), ConditionKind::ReferencesResolved),
        Some(ConditionStatus::False)
    );
    assert_eq!(
        condition_status(waiting.resource.conditions(), ConditionKind::Recoverable),
        None
    );
    assert_eq!(system.metrics.get("CreateSubnet").calls, 0);
    assert_eq!(system.metrics.get("DescribeSubnets").calls, 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    let ready = system.vpcs.reconcile(pending.resource).await;
    assert!(condition::is_synced(ready.resource.conditions()));
    let vpc_id = ready.resource.identifiers().id.clone().unwrap();

    let created = system.subnets.converge(waiting.resource, 5).await;
    assert!(created.is_ok(), "{:?}", created.error);
    assert_eq!(created.action, ReconcileAction::Created);
    assert_eq!(
        condition_status(created.resource.conditions(), ConditionKind::ReferencesResolved),
        Some(ConditionStatus::True)
    );
    // The resolved ID goes to the service, not into the stored spec.
    assert_eq!(created.resource.spec.vpc_id, None);
    let subnet_id = created.resource.identifiers().id.clone().unwrap();
    let record = system
        .subnet_service
        .describe(subnet_id.as_str().into())
        .await
        .unwrap();
    assert_eq!(record.vpc_id, VpcId(vpc_id));
    assert_eq!(record.availability_zone, "us-west-2a");

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reference_to_missing_vpc_backs_off() {
    let system = start(CONFIG, Duration::ZERO);

    let outcome = system.subnets.reconcile(subnet_of("nowhere")).await;

    assert!(outcome.error.as_ref().unwrap().is_not_found());
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(1)));
    assert_eq!(
        condition_status(outcome.resource.conditions(), ConditionKind::Recoverable),
        Some(ConditionStatus::True)
    );
    assert_eq!(system.metrics.get("CreateSubnet").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_conflicting_vpc_id_and_reference_is_terminal() {
    let system = start(CONFIG, Duration::ZERO);
    let mut subnet = subnet_of("main");
    subnet.spec.vpc_id = Some("vpc-00000001".to_string());

    let outcome = system.subnets.reconcile(subnet).await;

    assert_eq!(outcome.error.as_ref().unwrap().kind(), ErrorKind::Terminal);
    assert_eq!(outcome.requeue, Requeue::None);
    assert_eq!(
        condition_status(outcome.resource.conditions(), ConditionKind::Terminal),
        Some(ConditionStatus::True)
    );

    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_is_synced_follows_remote_provisioning() {
    let system = start(CONFIG, Duration::from_secs(10));

    let outcome = system.vpcs.reconcile(vpc("main")).await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(5)));
    assert_eq!(outcome.resource.status.fields.state.as_deref(), Some("pending"));
    let synced = condition::find(outcome.resource.conditions(), ConditionKind::ResourceSynced)
        .unwrap();
    assert_eq!(synced.status, ConditionStatus::False);

    let ctx = ReconcileContext::new();
    let manager = system.vpcs.manager();
    assert!(!manager.is_synced(&ctx, &outcome.resource).await.unwrap());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(manager.is_synced(&ctx, &outcome.resource).await.unwrap());

    let next = system.vpcs.reconcile(outcome.resource).await;
    assert_eq!(next.action, ReconcileAction::None);
    assert!(condition::is_synced(next.resource.conditions()));
    assert_eq!(next.resource.status.fields.state.as_deref(), Some("available"));
    assert_eq!(next.requeue, Requeue::After(Duration::from_secs(300)));

    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_converge_sleeps_through_provisioning() {
    let system = start(CONFIG, Duration::from_secs(12));

    let outcome = system.vpcs.converge(vpc("main"), 10).await;

    assert!(outcome.is_ok());
    assert!(condition::is_synced(outcome.resource.conditions()));
    assert_eq!(system.metrics.get("CreateVpc").calls, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_initialization_reaches_fixed_point() {
    let system = start(CONFIG, Duration::ZERO);

    let first = system.vpcs.reconcile(vpc("main")).await;
    assert_eq!(first.action, ReconcileAction::Created);
    assert_eq!(first.resource.spec.instance_tenancy.as_deref(), Some("default"));
    assert_eq!(first.resource.spec.enable_dns_support, Some(true));
    assert_eq!(
        condition_status(first.resource.conditions(), ConditionKind::LateInitialized),
        Some(ConditionStatus::True)
    );

    let second = system.vpcs.reconcile(first.resource.clone()).await;
    assert_eq!(second.action, ReconcileAction::None);
    assert_eq!(second.resource.spec, first.resource.spec);
    assert_eq!(system.metrics.get("ModifyVpcAttribute").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_generated_id_wins_over_name() {
    let system = start(CONFIG, Duration::ZERO);
    let create = |name: &str| VpcCreate {
        cidr_block: "10.0.0.0/16".to_string(),
        instance_tenancy: None,
        enable_dns_support: None,
        tags: named(name),
    };
    let a = system.vpc_service.create(create("a")).await.unwrap();
    let b = system.vpc_service.create(create("b")).await.unwrap();

    let ctx = ReconcileContext::new();
    let manager = system.vpcs.manager();

    // No ID yet: found by name
    let by_name = manager.read_one(&ctx, &vpc("b")).await.unwrap();
    assert_eq!(by_name.identifiers().id.as_deref(), Some(b.id.0.as_str()));

    // An ID points elsewhere than the name: the ID wins
    let mut addressed = vpc("b");
    addressed.set_identifiers(ResourceIdentifiers {
        arn: None,
        name: Some("infra/b".to_string()),
        id: Some(a.id.0.clone()),
    });
    let by_id = manager.read_one(&ctx, &addressed).await.unwrap();
    assert_eq!(by_id.identifiers().id.as_deref(), Some(a.id.0.as_str()));
    assert_eq!(system.metrics.get("DescribeVpcs").calls, 2);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tags_are_merged_not_replaced() {
    let system = start(CONFIG, Duration::ZERO);
    let mut desired = bucket("bucket-a");
    desired.spec.tags.insert("team".to_string(), "infra".to_string());

    let created = system.buckets.reconcile(desired).await;
    assert!(created.is_ok());
    assert_eq!(system.metrics.get("PutBucketTagging").calls, 1);

    // Someone else tags the bucket out of band.
    system
        .bucket_service
        .tag(
            "bucket-a".to_string(),
            BTreeMap::from([("cost-center".to_string(), "42".to_string())]),
        )
        .await
        .unwrap();

    let again = system.buckets.reconcile(created.resource).await;
    assert!(again.is_ok());
    assert_eq!(again.action, ReconcileAction::None);
    assert_eq!(system.metrics.get("PutBucketTagging").calls, 1);

    let tags = system
        .bucket_service
        .describe("bucket-a".to_string())
        .await
        .unwrap()
        .tags;
    assert_eq!(tags.get("team").map(String::as_str), Some("infra"));
    assert_eq!(tags.get("cost-center").map(String::as_str), Some("42"));
    assert_eq!(
        tags.get("services.k8s.aws/managed-by").map(String::as_str),
        Some("s3-controller")
    );
    assert_eq!(
        tags.get("services.k8s.aws/namespace").map(String::as_str),
        Some("infra")
    );

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_immutable_field_change_is_terminal() {
    let system = start(CONFIG, Duration::ZERO);
    let mut synced = system.vpcs.reconcile(vpc("main")).await.resource;

    synced.spec.cidr_block = "10.1.0.0/16".to_string();
    let outcome = system.vpcs.reconcile(synced).await;

    let error = outcome.error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::InvariantViolation);
    assert!(error.to_string().contains("cidr_block"));
    assert_eq!(outcome.requeue, Requeue::None);
    assert_eq!(
        condition_status(outcome.resource.conditions(), ConditionKind::Terminal),
        Some(ConditionStatus::True)
    );
    assert_eq!(system.metrics.get("ModifyVpcAttribute").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mutable_vpc_attribute_is_modified() {
    let system = start(CONFIG, Duration::ZERO);
    let mut synced = system.vpcs.reconcile(vpc("main")).await.resource;

    synced.spec.enable_dns_support = Some(false);
    let outcome = system.vpcs.reconcile(synced).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::Updated);
    assert_eq!(system.metrics.get("ModifyVpcAttribute").calls, 1);
    let id = outcome.resource.identifiers().id.clone().unwrap();
    let record = system.vpc_service.describe(VpcId(id)).await.unwrap();
    assert!(!record.enable_dns_support);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_throttling_is_recoverable() {
    let system = start(CONFIG, Duration::ZERO);
    let synced = system.buckets.reconcile(bucket("bucket-a")).await.resource;

    system.bucket_service.inject_throttle(1).await.unwrap();
    let throttled = system.buckets.reconcile(synced).await;

    assert_eq!(throttled.error.as_ref().unwrap().kind(), ErrorKind::Transient);
    assert_eq!(throttled.requeue, Requeue::After(Duration::from_secs(1)));
    assert_eq!(
        condition_status(throttled.resource.conditions(), ConditionKind::Recoverable),
        Some(ConditionStatus::True)
    );
    assert!(!condition::is_synced(throttled.resource.conditions()));

    let recovered = system.buckets.reconcile(throttled.resource).await;
    assert!(recovered.is_ok());
    assert_eq!(
        condition_status(recovered.resource.conditions(), ConditionKind::Recoverable),
        None
    );
    assert!(condition::is_synced(recovered.resource.conditions()));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_throttling_backs_off_exponentially() {
    let system = start(CONFIG, Duration::ZERO);
    system.bucket_service.inject_throttle(3).await.unwrap();

    let mut resource = bucket("bucket-a");
    let mut delays = Vec::new();
    for _ in 0..3 {
        let outcome = system.buckets.reconcile(resource).await;
        delays.push(outcome.requeue);
        resource = outcome.resource;
    }

    assert_eq!(
        delays,
        vec![
            Requeue::After(Duration::from_secs(1)),
            Requeue::After(Duration::from_secs(2)),
            Requeue::After(Duration::from_secs(4)),
        ]
    );
    let created = system.buckets.reconcile(resource).await;
    assert_eq!(created.action, ReconcileAction::Created);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_equal_names_in_other_namespaces_are_distinct() {
    let system = start(CONFIG, Duration::ZERO);
    let in_namespace = |namespace: &str| {
        Vpc::new(
            ObjectMeta::new(namespace, "core"),
            VpcSpec {
                cidr_block: "10.0.0.0/16".to_string(),
                ..VpcSpec::default()
            },
        )
    };

    let first = system.vpcs.reconcile(in_namespace("team-a")).await;
    let second = system.vpcs.reconcile(in_namespace("team-b")).await;

    assert_eq!(first.action, ReconcileAction::Created);
    assert_eq!(second.action, ReconcileAction::Created);
    assert_ne!(first.resource.identifiers().id, second.resource.identifiers().id);
    assert_eq!(system.metrics.get("CreateVpc").calls, 2);
    assert_eq!(
        second.resource.identifiers().name.as_deref(),
        Some("team-b/core")
    );

    let mut gone = first.resource;
    gone.meta.deletion_requested = true;
    assert!(system.vpcs.reconcile(gone).await.is_finalized());
    let kept = system
        .vpc_service
        .describe(VpcId(second.resource.identifiers().id.clone().unwrap()))
        .await;
    assert!(kept.is_ok());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_existing_bucket_is_adopted() {
    let system = start(CONFIG, Duration::ZERO);
    system
        .bucket_service
        .create(BucketCreate {
            name: "legacy-bucket".to_string(),
            encryption: Some("aws:kms".to_string()),
            cors_allowed_origins: Vec::new(),
            versioning: Some(true),
            tags: BTreeMap::new(),
            customer_key: None,
        })
        .await
        .unwrap();

    let outcome = system.buckets.reconcile(bucket("legacy-bucket")).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.action, ReconcileAction::Adopted);
    assert_eq!(outcome.resource.annotation(ADOPTED_ANNOTATION), Some("true"));
    assert_eq!(outcome.resource.spec.encryption.as_deref(), Some("aws:kms"));
    assert_eq!(outcome.resource.spec.versioning, Some(true));
    assert_eq!(system.metrics.get("CreateBucket").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_adoption_requires_configuration() {
    let raw = CONFIG.replace("enable_adoption = true", "enable_adoption = false");
    let system = start(&raw, Duration::ZERO);
    system
        .bucket_service
        .create(BucketCreate {
            name: "legacy-bucket".to_string(),
            encryption: None,
            cors_allowed_origins: Vec::new(),
            versioning: None,
            tags: BTreeMap::new(),
            customer_key: None,
        })
        .await
        .unwrap();

    let outcome = system.buckets.reconcile(bucket("legacy-bucket")).await;

    assert_eq!(outcome.error.as_ref().unwrap().kind(), ErrorKind::Terminal);
    let finalizer = system.buckets.reconciler().descriptor().finalizer().to_string();
    assert!(!outcome.resource.meta.has_finalizer(&finalizer));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subnets_are_never_adopted() {
    let system = start(CONFIG, Duration::ZERO);
    let synced = system.vpcs.reconcile(vpc("main")).await.resource;
    let vpc_id = synced.identifiers().id.clone().unwrap();
    system
        .subnet_service
        .create(SubnetCreate {
            vpc_id: VpcId(vpc_id),
            cidr_block: "10.0.1.0/24".to_string(),
            availability_zone: None,
            map_public_ip_on_launch: None,
            tags: named("private-a"),
        })
        .await
        .unwrap();

    let outcome = system.subnets.reconcile(subnet_of("main")).await;

    assert_eq!(outcome.error.as_ref().unwrap().kind(), ErrorKind::Terminal);
    assert_eq!(outcome.action, ReconcileAction::None);
    assert_eq!(system.metrics.get("CreateSubnet").calls, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_is_idempotent_for_every_kind() {
    let system = start(CONFIG, Duration::ZERO);
    let mut bucket = system.buckets.reconcile(bucket("bucket-a")).await.resource;
    let mut vpc = system.vpcs.reconcile(vpc("main")).await.resource;
    let mut subnet = system.subnets.converge(subnet_of("main"), 3).await.resource;
    assert!(condition::is_synced(subnet.conditions()));

    bucket.meta.deletion_requested = true;
    vpc.meta.deletion_requested = true;
    subnet.meta.deletion_requested = true;

    let s = system.subnets.reconcile(subnet.clone()).await;
    let v = system.vpcs.reconcile(vpc.clone()).await;
    let b = system.buckets.reconcile(bucket.clone()).await;
    assert_eq!(
        (s.action, v.action, b.action),
        (ReconcileAction::Deleted, ReconcileAction::Deleted, ReconcileAction::Deleted)
    );
    assert!(s.is_finalized() && v.is_finalized() && b.is_finalized());
    assert!(s.resource.meta.finalizers.is_empty());
    assert!(system.reader.is_empty());

    // Same request again, finalizer still present: the resources are already gone.
    let s = system.subnets.reconcile(subnet).await;
    let v = system.vpcs.reconcile(vpc).await;
    let b = system.buckets.reconcile(bucket).await;
    assert_eq!(
        (s.action, v.action, b.action),
        (ReconcileAction::None, ReconcileAction::None, ReconcileAction::None)
    );
    assert!(s.is_finalized() && v.is_finalized() && b.is_finalized());

    // And once more after the finalizer is gone.
    let again = system.buckets.reconcile(b.resource).await;
    assert!(again.is_finalized());
    assert_eq!(system.metrics.get("DeleteBucket").calls, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_managers_are_reused_per_tenant() {
    let system = start(CONFIG, Duration::ZERO);
    let config = ControllerConfig::from_toml_str(CONFIG).unwrap();
    let session = Session::new(
        config.account_id.clone(),
        config.region.clone(),
        Credentials::new("AKIDEXAMPLE", "secret"),
    );

    let manager = system
        .buckets
        .managers()
        .manager_for(&session, &config.account_id, &config.region)
        .unwrap();

    assert!(std::sync::Arc::ptr_eq(&manager, system.buckets.manager()));
    assert_eq!(system.buckets.managers().len(), 1);
    assert_eq!(system.factories.len(), 3);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_services() {
    let system = start(CONFIG, Duration::ZERO);
    system.buckets.reconcile(bucket("bucket-a")).await;

    assert!(system.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_arn_derivation_is_per_type() {
    let system = start(CONFIG, Duration::ZERO);

    assert_eq!(
        system.buckets.manager().arn_from_name("bucket-a"),
        Some(bucket_arn("bucket-a"))
    );
    assert_eq!(
        system
            .buckets
            .manager()
            .arn_from_name("bucket-a")
            .map(|arn| arn.to_string()),
        Some("arn:aws:s3:::bucket-a".to_string())
    );
    // IDs are assigned by the service, so names say nothing about the ARN.
    assert_eq!(system.vpcs.manager().arn_from_name("main"), None);
    assert_eq!(system.subnets.manager().arn_from_name("private-a"), None);

    system.shutdown().await.unwrap();
}
