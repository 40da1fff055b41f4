use super::{ensure_updatable, observed, tags_to_write};
use crate::backend::RemoteClient;
use crate::model::{bucket_arn, Bucket, BucketCreate, BucketRecord, BucketSpec, BucketStatus, BucketUpdate};
use async_trait::async_trait;
use controller_runtime::{
    AccountId, Address, ComparisonPolicy, ControllerConfig, Delta, FieldRule, ManagerScope, Metrics,
    ReconcileContext, Reconciler, Region, ResourceDescriptor, ResourceError, ResourceIdentifiers,
    ResourceManager, ResourceManagerFactory, ResourceName, ResourceSpec, Result,
    ServiceControllerMetadata, Session,
};
use std::sync::Arc;
use tracing::{debug, instrument};

const UPDATABLE: &[&str] = &["encryption", "cors_allowed_origins", "versioning"];

pub struct BucketManager {
    scope: ManagerScope,
    client: RemoteClient<BucketRecord>,
}

impl BucketManager {
    /// The bucket name to address, preferring the ARN once one is known.
    fn bucket_name(&self, resource: &Bucket) -> Result<String> {
        match resource.identifiers().address() {
            Some(Address::Arn(arn)) => Ok(arn.parts()?.resource.to_string()),
            Some(Address::Id(name)) | Some(Address::Name(name)) => Ok(name),
            None if !resource.spec.name.is_empty() => Ok(resource.spec.name.clone()),
            None => Err(ResourceError::terminal(format!(
                "{} does not name a bucket",
                resource.key()
            ))),
        }
    }

    /// Reads the customer-provided key, when the spec references one.
    async fn customer_key(
        &self,
        ctx: &ReconcileContext,
        desired: &Bucket,
    ) -> Result<Option<String>> {
        let Some(reference) = &desired.spec.customer_key else {
            return Ok(None);
        };
        let key = self
            .scope
            .reconciler
            .secret_value(ctx, &desired.meta.namespace, reference)
            .await?;
        Ok(Some(key))
    }

    async fn head(&self, ctx: &ReconcileContext, name: String) -> Result<BucketRecord> {
        self.scope
            .call(ctx, "HeadBucket", self.client.describe(name))
            .await
    }
}

fn to_resource(desired: &Bucket, record: BucketRecord) -> Bucket {
    let identifiers = ResourceIdentifiers {
        arn: Some(record.arn),
        name: Some(record.name.clone()),
        id: None,
    };
    let spec = BucketSpec {
        name: record.name,
        encryption: Some(record.encryption),
        cors_allowed_origins: record.cors_allowed_origins,
        versioning: Some(record.versioning),
        tags: record.tags,
        customer_key: desired.spec.customer_key.clone(),
    };
    let status = BucketStatus {
        location: Some(record.region),
    };
    observed(desired, spec, &identifiers, status)
}

#[async_trait]
impl ResourceManager for BucketManager {
    type Spec = BucketSpec;

    async fn read_one(&self, ctx: &ReconcileContext, desired: &Bucket) -> Result<Bucket> {
        let record = self.head(ctx, self.bucket_name(desired)?).await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(bucket = %desired.spec.name))]
    async fn create(&self, ctx: &ReconcileContext, desired: &Bucket) -> Result<Bucket> {
        let spec = &desired.spec;
        let params = BucketCreate {
            name: spec.name.clone(),
            encryption: spec.encryption.clone(),
            cors_allowed_origins: spec.cors_allowed_origins.clone(),
            versioning: spec.versioning,
            tags: spec.tags.clone(),
            customer_key: self.customer_key(ctx, desired).await?,
        };
        let record = self
            .scope
            .call(ctx, "CreateBucket", self.client.create(params))
            .await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(bucket = %desired.spec.name))]
    async fn update(
        &self,
        ctx: &ReconcileContext,
        desired: &Bucket,
        latest: &Bucket,
        delta: &Delta,
    ) -> Result<Bucket> {
        ensure_updatable(delta, UPDATABLE)?;
        let spec = &desired.spec;
        let update = BucketUpdate {
            encryption: spec.encryption.clone().filter(|_| delta.different_at("encryption")),
            cors_allowed_origins: delta
                .different_at("cors_allowed_origins")
                .then(|| spec.cors_allowed_origins.clone()),
            versioning: spec.versioning.filter(|_| delta.different_at("versioning")),
        };
        if update.is_empty() {
            return Err(ResourceError::invariant(
                "delta names no field the bucket update can carry",
            ));
        }
        debug!(?update, "Updating bucket");
        let record = self
            .scope
            .call(
                ctx,
                "PutBucketConfiguration",
                self.client.update(self.bucket_name(latest)?, update),
            )
            .await?;
        Ok(to_resource(desired, record))
    }

    async fn delete(&self, ctx: &ReconcileContext, latest: &Bucket) -> Result<Bucket> {
        let name = self.bucket_name(latest)?;
        match self
            .scope
            .call(ctx, "DeleteBucket", self.client.delete(name))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(latest.clone()),
        }
    }

    fn arn_from_name(&self, name: &str) -> Option<ResourceName> {
        Some(bucket_arn(name))
    }

    async fn late_initialize(&self, ctx: &ReconcileContext, resource: &Bucket) -> Result<Bucket> {
        let spec = &resource.spec;
        if spec.encryption.is_some() && spec.versioning.is_some() {
            return Ok(resource.clone());
        }
        let record = self.head(ctx, self.bucket_name(resource)?).await?;
        let mut initialized = resource.clone();
        initialized.spec.encryption = spec.encryption.clone().or(Some(record.encryption));
        initialized.spec.versioning = spec.versioning.or(Some(record.versioning));
        Ok(initialized)
    }

    async fn ensure_tags(
        &self,
        ctx: &ReconcileContext,
        resource: &Bucket,
        metadata: &ServiceControllerMetadata,
    ) -> Result<()> {
        let name = self.bucket_name(resource)?;
        let record = self
            .scope
            .call(ctx, "GetBucketTagging", self.client.describe(name.clone()))
            .await?;
        let missing = tags_to_write(
            &self.scope.config,
            metadata,
            &resource.key(),
            &record.tags,
            &resource.spec.tags,
        );
        if missing.is_empty() {
            return Ok(());
        }
        debug!(?missing, "Tagging bucket");
        self.scope
            .call(ctx, "PutBucketTagging", self.client.tag(name, missing))
            .await?;
        Ok(())
    }
}

/// Builds [`BucketManager`]s over one storage service.
pub struct BucketManagerFactory {
    client: RemoteClient<BucketRecord>,
}

impl BucketManagerFactory {
    pub fn new(client: RemoteClient<BucketRecord>) -> Self {
        Self { client }
    }
}

impl ResourceManagerFactory for BucketManagerFactory {
    type Manager = BucketManager;

    fn descriptor(&self) -> ResourceDescriptor<BucketSpec> {
        ResourceDescriptor::new(
            ComparisonPolicy::new()
                .field("name")
                .field("encryption")
                .rule(FieldRule::new("cors_allowed_origins").unordered())
                .field("versioning"),
        )
    }

    fn manager_for(
        &self,
        config: ControllerConfig,
        metrics: Metrics,
        reconciler: Arc<dyn Reconciler>,
        session: &Session,
        account_id: AccountId,
        region: Region,
    ) -> Result<BucketManager> {
        let scope = ManagerScope::new(
            &BucketSpec::group_kind(),
            config,
            metrics,
            reconciler,
            session,
            account_id,
            region,
        )?;
        Ok(BucketManager {
            scope,
            client: self.client.clone(),
        })
    }

    fn is_adoptable(&self) -> bool {
        true
    }

    fn requeue_on_success_seconds(&self) -> u64 {
        0
    }
}
