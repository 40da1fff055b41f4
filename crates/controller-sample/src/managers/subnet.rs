use super::{ensure_updatable, find_named, name_tag, observed, tags_to_write};
use crate::backend::RemoteClient;
use crate::model::{
    Subnet, SubnetCreate, SubnetId, SubnetRecord, SubnetSpec, SubnetStatus, SubnetUpdate, VpcId,
    VpcSpec, NAME_TAG,
};
use async_trait::async_trait;
use controller_runtime::reader::require_synced;
use controller_runtime::{
    AccountId, Address, ComparisonPolicy, ControllerConfig, Delta, ManagerScope, Metrics,
    ReconcileContext, Reconciler, ReferenceReader, Region, ResourceDescriptor, ResourceError,
    ResourceIdentifiers, ResourceManager, ResourceManagerFactory, ResourceName, ResourceSpec,
    Result, ServiceControllerMetadata, Session,
};
use std::sync::Arc;
use tracing::{debug, instrument};

const UPDATABLE: &[&str] = &["map_public_ip_on_launch"];

pub struct SubnetManager {
    scope: ManagerScope,
    client: RemoteClient<SubnetRecord>,
}

impl SubnetManager {
    fn subnet_id(&self, resource: &Subnet) -> Result<Option<SubnetId>> {
        match resource.identifiers().address() {
            Some(Address::Arn(arn)) => {
                let parts = arn.parts()?;
                parts
                    .resource
                    .strip_prefix("subnet/")
                    .map(|id| Some(SubnetId::from(id)))
                    .ok_or_else(|| ResourceError::terminal(format!("{arn} is not a subnet ARN")))
            }
            Some(Address::Id(id)) => Ok(Some(SubnetId(id))),
            Some(Address::Name(_)) | None => Ok(None),
        }
    }

    fn subnet_name(resource: &Subnet) -> String {
        name_tag(resource, &resource.spec.tags)
    }

    async fn describe(&self, ctx: &ReconcileContext, resource: &Subnet) -> Result<SubnetRecord> {
        match self.subnet_id(resource)? {
            Some(id) => {
                self.scope
                    .call(ctx, "DescribeSubnets", self.client.describe(id))
                    .await
            }
            None => {
                let name = Self::subnet_name(resource);
                let subnets = self
                    .scope
                    .call(ctx, "DescribeSubnets", self.client.list())
                    .await?;
                find_named(subnets, &name, SubnetRecord::name)
            }
        }
    }

    fn require_id(&self, resource: &Subnet) -> Result<SubnetId> {
        self.subnet_id(resource)?.ok_or_else(|| {
            ResourceError::invariant(format!("{} has no subnet ID after creation", resource.key()))
        })
    }
}

fn to_resource(desired: &Subnet, record: SubnetRecord) -> Subnet {
    let identifiers = ResourceIdentifiers {
        arn: Some(record.arn.clone()),
        name: record.name().map(str::to_string),
        id: Some(record.id.0.clone()),
    };
    let status = SubnetStatus {
        state: Some("available".to_string()),
        available_ip_address_count: Some(record.available_ip_address_count),
    };
    let spec = SubnetSpec {
        cidr_block: record.cidr_block,
        vpc_id: Some(record.vpc_id.0),
        vpc_ref: desired.spec.vpc_ref.clone(),
        availability_zone: Some(record.availability_zone),
        map_public_ip_on_launch: Some(record.map_public_ip_on_launch),
        tags: record.tags,
    };
    observed(desired, spec, &identifiers, status)
}

#[async_trait]
impl ResourceManager for SubnetManager {
    type Spec = SubnetSpec;

    async fn read_one(&self, ctx: &ReconcileContext, desired: &Subnet) -> Result<Subnet> {
        let record = self.describe(ctx, desired).await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(cidr = %desired.spec.cidr_block))]
    async fn create(&self, ctx: &ReconcileContext, desired: &Subnet) -> Result<Subnet> {
        let spec = &desired.spec;
        let Some(vpc_id) = spec.vpc_id.clone() else {
            return Err(ResourceError::terminal(format!(
                "{} needs vpc_id or vpc_ref",
                desired.key()
            )));
        };
        let mut tags = spec.tags.clone();
        tags.entry(NAME_TAG.to_string())
            .or_insert_with(|| Self::subnet_name(desired));
        let params = SubnetCreate {
            vpc_id: VpcId(vpc_id),
            cidr_block: spec.cidr_block.clone(),
            availability_zone: spec.availability_zone.clone(),
            map_public_ip_on_launch: spec.map_public_ip_on_launch,
            tags,
        };
        let record = self
            .scope
            .call(ctx, "CreateSubnet", self.client.create(params))
            .await?;
        Ok(to_resource(desired, record))
    }

    #[instrument(skip_all, fields(key = %desired.key()))]
    async fn update(
        &self,
        ctx: &ReconcileContext,
        desired: &Subnet,
        latest: &Subnet,
        delta: &Delta,
    ) -> Result<Subnet> {
        ensure_updatable(delta, UPDATABLE)?;
        let update = SubnetUpdate {
            map_public_ip_on_launch: desired.spec.map_public_ip_on_launch,
        };
        debug!(?update, "Modifying subnet");
        let record = self
            .scope
            .call(
                ctx,
                "ModifySubnetAttribute",
                self.client.update(self.require_id(latest)?, update),
            )
            .await?;
        Ok(to_resource(desired, record))
    }

    async fn delete(&self, ctx: &ReconcileContext, latest: &Subnet) -> Result<Subnet> {
        let id = self.require_id(latest)?;
        match self
            .scope
            .call(ctx, "DeleteSubnet", self.client.delete(id))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(latest.clone()),
        }
    }

    fn arn_from_name(&self, _name: &str) -> Option<ResourceName> {
        None
    }

    async fn late_initialize(&self, ctx: &ReconcileContext, resource: &Subnet) -> Result<Subnet> {
        let spec = &resource.spec;
        if spec.availability_zone.is_some() && spec.map_public_ip_on_launch.is_some() {
            return Ok(resource.clone());
        }
        let record = self.describe(ctx, resource).await?;
        let mut initialized = resource.clone();
        initialized.spec.availability_zone = spec
            .availability_zone
            .clone()
            .or(Some(record.availability_zone));
        initialized.spec.map_public_ip_on_launch = spec
            .map_public_ip_on_launch
            .or(Some(record.map_public_ip_on_launch));
        Ok(initialized)
    }

    /// Turns `vpc_ref` into the referenced VPC's ID.
    ///
    /// The referenced VPC must be synced; until then this is `Unresolved`.
    async fn resolve_references(
        &self,
        ctx: &ReconcileContext,
        reader: &dyn ReferenceReader,
        resource: &Subnet,
    ) -> Result<Subnet> {
        let Some(vpc_ref) = &resource.spec.vpc_ref else {
            return Ok(resource.clone());
        };
        if resource.spec.vpc_id.is_some() {
            return Err(ResourceError::terminal(format!(
                "{} sets both vpc_id and vpc_ref",
                resource.key()
            )));
        }
        ctx.check()?;
        let key = vpc_ref.key(&resource.meta.namespace);
        let vpc = require_synced(reader, &VpcSpec::group_kind(), &key).await?;
        let Some(vpc_id) = vpc.identifiers.id else {
            return Err(ResourceError::unresolved(
                format!("VPC {key}"),
                "referenced VPC has no ID yet",
            ));
        };
        debug!(%key, %vpc_id, "Resolved VPC reference");
        let mut resolved = resource.clone();
        resolved.spec.vpc_id = Some(vpc_id);
        Ok(resolved)
    }

    async fn ensure_tags(
        &self,
        ctx: &ReconcileContext,
        resource: &Subnet,
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
        debug!(?missing, "Tagging subnet");
        self.scope
            .call(ctx, "CreateTags", self.client.tag(record.id, missing))
            .await?;
        Ok(())
    }
}

/// Builds [`SubnetManager`]s over one network service.
pub struct SubnetManagerFactory {
    client: RemoteClient<SubnetRecord>,
}

impl SubnetManagerFactory {
    pub fn new(client: RemoteClient<SubnetRecord>) -> Self {
        Self { client }
    }
}

impl ResourceManagerFactory for SubnetManagerFactory {
    type Manager = SubnetManager;

    fn descriptor(&self) -> ResourceDescriptor<SubnetSpec> {
        ResourceDescriptor::new(
            ComparisonPolicy::new()
                .field("cidr_block")
                .field("vpc_id")
                .field("availability_zone")
                .field("map_public_ip_on_launch"),
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
    ) -> Result<SubnetManager> {
        let scope = ManagerScope::new(
            &SubnetSpec::group_kind(),
            config,
            metrics,
            reconciler,
            session,
            account_id,
            region,
        )?;
        Ok(SubnetManager {
            scope,
            client: self.client.clone(),
        })
    }

    fn is_adoptable(&self) -> bool {
        false
    }

    fn requeue_on_success_seconds(&self) -> u64 {
        0
    }
}
