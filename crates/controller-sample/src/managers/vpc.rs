use super::{ensure_updatable, find_named, name_tag, observed, tags_to_write};
use crate::backend::RemoteClient;
use crate::model::{Vpc, VpcCreate, VpcId, VpcRecord, VpcSpec, VpcState, VpcStatus, VpcUpdate, NAME_TAG};
use async_trait::async_trait;
use controller_runtime::{
    AccountId, Address, ComparisonPolicy, ControllerConfig, Delta, ManagerScope, Metrics,
    ReconcileContext, Reconciler, Region, ResourceDescriptor, ResourceError, ResourceIdentifiers,
    ResourceManager, ResourceManagerFactory, ResourceName, ResourceSpec, Result,
    ServiceControllerMetadata, Session,
};
use std::sync::Arc;
use tracing::{debug, instrument};

const UPDATABLE: &[&str] = &["instance_tenancy", "enable_dns_support"];

/// Seconds between drift checks of a synced VPC.
const RESYNC_SECONDS: u64 = 300;

pub struct VpcManager {
    scope: ManagerScope,
    client: RemoteClient<VpcRecord>,
}

impl VpcManager {
    /// The generated ID, from the ARN or the ID itself. `None` before creation.
    fn vpc_id(&self, resource: &Vpc) -> Result<Option<VpcId>> {
        match resource.identifiers().address() {
            Some(Address::Arn(arn)) => {
                let parts = arn.parts()?;
                parts
                    .resource
                    .strip_prefix("vpc/")
                    .map(|id| Some(VpcId::from(id)))
                    .ok_or_else(|| ResourceError::terminal(format!("{arn} is not a VPC ARN")))
            }
            Some(Address::Id(id)) => Ok(Some(VpcId(id))),
            Some(Address::Name(_)) | None => Ok(None),
        }
    }

    fn vpc_name(resource: &Vpc) -> String {
        name_tag(resource, &resource.spec.tags)
    }

    async fn describe(&self, ctx: &ReconcileContext, resource: &Vpc) -> Result<VpcRecord> {
        match self.vpc_id(resource)? {
            Some(id) => {
                self.scope
                    .call(ctx, "DescribeVpcs", self.client.describe(id))
                    .await
            }
            None => {
                let name = Self::vpc_name(resource);
                let vpcs = self
                    .scope
                    .call(ctx, "DescribeVpcs", self.client.list())
                    .await?;
                find_named(vpcs, &name, VpcRecord::name)
            }
        }
    }

    fn require_id(&self, resource: &Vpc) -> Result<VpcId> {
        self.vpc_id(resource)?.ok_or_else(|| {
            ResourceError::invariant(format!("{} has no VPC ID after creation", resource.key()))
        })
    }
}

fn to_resource(desired: &Vpc, record: VpcRecord) -> Vpc {
    let identifiers = ResourceIdentifiers {
        arn: Some(record.arn.clone()),
        name: record.name().map(str::to_string),
        id: Some(record.id.0.clone()),
    };
    let status = VpcStatus {
        state: Some(record.state.to_string()),
        owner_id: Some(record.owner_id),
    };
    let spec = VpcSpec {
        cidr_block: record.cidr_block,
        instance_tenancy: Some(record.instance_tenancy),
        enable_dns_support: Some(record.enable_dns_support),
        tags: record.tags,
    };
    observed(desired, spec, &identifiers, status)
}

#[async_trait]
impl ResourceManager for VpcManager {
    type Spec = VpcSpec;

    async fn read_one(&self, ctx: &ReconcileContext, desired: &Vpc) -> Result<Vpc> {
        let record = self.describe(ctx, desired).await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(cidr = %desired.spec.cidr_block))]
    async fn create(&self, ctx: &ReconcileContext, desired: &Vpc) -> Result<Vpc> {
        let spec = &desired.spec;
        let mut tags = spec.tags.clone();
        tags.entry(NAME_TAG.to_string())
            .or_insert_with(|| Self::vpc_name(desired));
        let params = VpcCreate {
            cidr_block: spec.cidr_block.clone(),
            instance_tenancy: spec.instance_tenancy.clone(),
            enable_dns_support: spec.enable_dns_support,
            tags,
        };
        let record = self
            .scope
            .call(ctx, "CreateVpc", self.client.create(params))
            .await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(key = %desired.key()))]
    async fn update(
        &self,
        ctx: &ReconcileContext,
        desired: &Vpc,
        latest: &Vpc,
        delta: &Delta,
    ) -> Result<Vpc> {
        ensure_updatable(delta, UPDATABLE)?;
        let spec = &desired.spec;
        let update = VpcUpdate {
            instance_tenancy: spec
                .instance_tenancy
                .clone()
                .filter(|_| delta.different_at("instance_tenancy")),
            enable_dns_support: spec
                .enable_dns_support
                .filter(|_| delta.different_at("enable_dns_support")),
        };
        debug!(?update, "Modifying VPC");
        let record = self
            .scope
            .call(
                ctx,
                "ModifyVpcAttribute",
                self.client.update(self.require_id(latest)?, update),
            )
            .await?;
        Ok(to_resource(desired, record))
    }

    async fn delete(&self, ctx: &ReconcileContext, latest: &Vpc) -> Result<Vpc> {
        let id = self.require_id(latest)?;
        match self
            .scope
            .call(ctx, "DeleteVpc", self.client.delete(id))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(latest.clone()),
        }
    }

    fn arn_from_name(&self, _name: &str) -> Option<ResourceName> {
        // VPC ARNs embed the generated ID, which a name alone cannot supply.
        None
    }

    async fn late_initialize(&self, ctx: &ReconcileContext, resource: &Vpc) -> Result<Vpc> {
        let spec = &resource.spec;
        if spec.instance_tenancy.is_some() && spec.enable_dns_support.is_some() {
            return Ok(resource.clone());
        }
        let record = self.describe(ctx, resource).await?;
        let mut initialized = resource.clone();
        initialized.spec.instance_tenancy = spec
            .instance_tenancy
            .clone()
            .or(Some(record.instance_tenancy));
        initialized.spec.enable_dns_support =
            spec.enable_dns_support.or(Some(record.enable_dns_support));
        Ok(initialized)
    }

    async fn is_synced(&self, ctx: &ReconcileContext, resource: &Vpc) -> Result<bool> {
        let record = self
            .scope
            .call(ctx, "DescribeVpcs", self.client.describe(self.require_id(resource)?))
            .await?;
        debug!(vpc = %record.id, state = %record.state, "Checked VPC state");
        Ok(record.state == VpcState::Available)
    }

    async fn ensure_tags(
        &self,
        ctx: &ReconcileContext,
        resource: &Vpc,
        metadata: &ServiceControllerMetadata,
    ) -> Result<()> {
        let record = self.describe(ctx, resource).await?;
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
        debug!(?missing, "Tagging VPC");
        self.scope
            .call(ctx, "CreateTags", self.client.tag(record.id, missing))
            .await?;
        Ok(())
    }
}

/// Builds [`VpcManager`]s over one network service.
pub struct VpcManagerFactory {
    client: RemoteClient<VpcRecord>,
}

impl VpcManagerFactory {
    pub fn new(client: RemoteClient<VpcRecord>) -> Self {
        Self { client }
    }
}

impl ResourceManagerFactory for VpcManagerFactory {
    type Manager = VpcManager;

    fn descriptor(&self) -> ResourceDescriptor<VpcSpec> {
        ResourceDescriptor::new(
            ComparisonPolicy::new()
                .field("cidr_block")
                .field("instance_tenancy")
                .field("enable_dns_support"),
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
    ) -> Result<VpcManager> {
        let scope = ManagerScope::new(
            &VpcSpec::group_kind(),
            config,
            metrics,
            reconciler,
            session,
            account_id,
            region,
        )?;
        Ok(VpcManager {
            scope,
            client: self.client.clone(),
        })
    }

    fn is_adoptable(&self) -> bool {
        true
    }

    fn requeue_on_success_seconds(&self) -> u64 {
        RESYNC_SECONDS
    }
}
