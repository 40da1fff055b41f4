//! # Controller Sample
//!
//! Runs the bucket, VPC and subnet controllers against simulated services
//! and walks through the reconciliation protocol:
//!
//! 1. A bucket is created; the service fills in its encryption and the next
//!    pass copies it into the spec without issuing an update.
//! 2. A subnet referencing a VPC that does not exist yet waits instead of
//!    failing.
//! 3. The VPC is created, stays `pending` for a while, then becomes synced;
//!    the subnet resolves its reference and is created.
//! 4. A spec change becomes an update carrying exactly the changed field.
//! 5. A throttled call is retried with backoff.
//! 6. Everything is deleted again, twice, to show deletion is idempotent.

use controller_runtime::tracing::setup_tracing;
use controller_runtime::{ControllerConfig, Credentials, ObjectMeta, Session};
use controller_sample::lifecycle::ControllerSystem;
use controller_sample::model::{
    Bucket, BucketSpec, ResourceRef, Subnet, SubnetSpec, Vpc, VpcSpec,
};
use std::time::Duration;
use tracing::{info, warn, Instrument};

const CONFIG: &str = r#"
account_id = "111122223333"
region = "us-west-2"
enable_adoption = true
resource_tags = [
    "services.k8s.aws/controller-version=%CONTROLLER_SERVICE%-%CONTROLLER_VERSION%",
    "services.k8s.aws/namespace=%K8S_NAMESPACE%",
]
"#;

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = ControllerConfig::from_toml_str(CONFIG).map_err(|e| e.to_string())?;
    let session = Session::new(
        config.account_id.clone(),
        config.region.clone(),
        Credentials::new("AKIDEXAMPLE", "secret"),
    );
    let system =
        ControllerSystem::with_provisioning_delay(config, &session, Duration::from_secs(2))
            .map_err(|e| e.to_string())?;

    // 1. Bucket with server-side defaults
    let bucket = Bucket::new(
        ObjectMeta::new("infra", "assets"),
        BucketSpec {
            name: "assets-111122223333".to_string(),
            cors_allowed_origins: vec![
                "https://b.example.com".into(),
                "https://a.example.com".into(),
            ],
            ..BucketSpec::default()
        },
    );
    let bucket = async {
        let created = system.buckets.reconcile(bucket).await;
        info!(action = ?created.action, arn = ?created.resource.identifiers().arn, "First pass");
        let again = system.buckets.reconcile(created.resource).await;
        info!(action = ?again.action, encryption = ?again.resource.spec.encryption, "Second pass");
        again.resource
    }
    .instrument(tracing::info_span!("bucket_demo"))
    .await;

    // 2. Subnet before its VPC exists
    let subnet = Subnet::new(
        ObjectMeta::new("infra", "private-a"),
        SubnetSpec {
            cidr_block: "10.0.1.0/24".to_string(),
            vpc_ref: Some(ResourceRef::new("main")),
            ..SubnetSpec::default()
        },
    );
    let waiting = system.subnets.reconcile(subnet).await;
    info!(requeue = ?waiting.requeue, error = ?waiting.error, "Subnet waits for its VPC");

    // 3. VPC provisioning, then the subnet
    let vpc = Vpc::new(
        ObjectMeta::new("infra", "main"),
        VpcSpec {
            cidr_block: "10.0.0.0/16".to_string(),
            ..VpcSpec::default()
        },
    );
    let vpc = system.vpcs.converge(vpc, 10).await;
    info!(
        state = ?vpc.resource.status.fields.state,
        id = ?vpc.resource.identifiers().id,
        "VPC converged"
    );
    let subnet = system.subnets.converge(waiting.resource, 10).await;
    info!(
        id = ?subnet.resource.identifiers().id,
        zone = ?subnet.resource.spec.availability_zone,
        "Subnet converged"
    );

    // 4. A spec change
    let mut bucket = bucket;
    bucket.spec.versioning = Some(true);
    let updated = system.buckets.reconcile(bucket).await;
    info!(action = ?updated.action, "Versioning enabled");

    // 5. Throttling
    system
        .bucket_service
        .inject_throttle(1)
        .await
        .map_err(|e| e.to_string())?;
    let throttled = system.buckets.reconcile(updated.resource).await;
    warn!(requeue = ?throttled.requeue, error = ?throttled.error, "Throttled pass");
    let bucket = system.buckets.converge(throttled.resource, 5).await.resource;

    // 6. Delete everything, twice
    let mut subnet = subnet.resource;
    let mut vpc = vpc.resource;
    let mut bucket = bucket;
    subnet.meta.deletion_requested = true;
    vpc.meta.deletion_requested = true;
    bucket.meta.deletion_requested = true;
    for pass in 1..=2 {
        let s = system.subnets.reconcile(subnet.clone()).await;
        let v = system.vpcs.reconcile(vpc.clone()).await;
        let b = system.buckets.reconcile(bucket.clone()).await;
        info!(
            pass,
            subnet = ?s.action,
            vpc = ?v.action,
            bucket = ?b.action,
            finalized = s.is_finalized() && v.is_finalized() && b.is_finalized(),
            "Deletion pass"
        );
    }

    for (operation, counts) in system.metrics.snapshot() {
        info!(operation = %operation, calls = counts.calls, errors = counts.errors, "Remote calls");
    }

    system.shutdown().await?;
    info!("Demo completed");
    Ok(())
}
