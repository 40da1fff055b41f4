//! Subnets inside a VPC.
//!
//! A subnet names its VPC either directly by ID or through `vpc_ref`, a
//! reference to a VPC custom resource in the same namespace (unless one is
//! given). The service refuses subnets whose VPC is missing or still
//! provisioning.

use crate::backend::{BackendError, RemoteClient, RemoteEntity, ServiceScope};
use crate::model::vpc::{valid_cidr, VpcId, VpcRecord, VpcState, NAME_TAG};
use async_trait::async_trait;
use controller_runtime::{CustomResource, GroupKind, ObjectKey, ResourceName, ResourceSpec, Tags};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Points at another custom resource by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// The referenced object's key, defaulting to the referrer's namespace.
    pub fn key(&self, referrer_namespace: &str) -> ObjectKey {
        ObjectKey::new(
            self.namespace.as_deref().unwrap_or(referrer_namespace),
            &self.name,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub cidr_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_ref: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_public_ip_on_launch: Option<bool>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_ip_address_count: Option<u32>,
}

impl ResourceSpec for SubnetSpec {
    type Status = SubnetStatus;

    fn group_kind() -> GroupKind {
        GroupKind::new("ec2.services.k8s.aws", "Subnet")
    }
}

pub type Subnet = CustomResource<SubnetSpec>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetId(pub String);

impl Display for SubnetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubnetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A subnet as the network service keeps it.
#[derive(Debug, Clone)]
pub struct SubnetRecord {
    pub id: SubnetId,
    pub arn: ResourceName,
    pub vpc_id: VpcId,
    pub cidr_block: String,
    pub availability_zone: String,
    pub map_public_ip_on_launch: bool,
    pub available_ip_address_count: u32,
    pub tags: Tags,
}

impl SubnetRecord {
    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SubnetCreate {
    pub vpc_id: VpcId,
    pub cidr_block: String,
    pub availability_zone: Option<String>,
    pub map_public_ip_on_launch: Option<bool>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default)]
pub struct SubnetUpdate {
    pub map_public_ip_on_launch: Option<bool>,
}

/// What the subnet service needs besides its own records.
#[derive(Clone)]
pub struct SubnetContext {
    pub scope: ServiceScope,
    pub vpcs: RemoteClient<VpcRecord>,
}

// Addresses in a block minus the five the service reserves.
fn usable_addresses(cidr: &str) -> u32 {
    cidr.split_once('/')
        .and_then(|(_, prefix)| prefix.parse::<u32>().ok())
        .filter(|prefix| *prefix <= 32)
        .map(|prefix| (1u64 << (32 - prefix)).saturating_sub(5) as u32)
        .unwrap_or(0)
}

#[async_trait]
impl RemoteEntity for SubnetRecord {
    type Id = SubnetId;
    type Create = SubnetCreate;
    type Update = SubnetUpdate;
    type Context = SubnetContext;

    fn assign_id(seq: u32, _params: &SubnetCreate) -> SubnetId {
        SubnetId(format!("subnet-{seq:08x}"))
    }

    fn from_create_params(
        id: SubnetId,
        params: SubnetCreate,
        ctx: &SubnetContext,
    ) -> Result<Self, BackendError> {
        if !valid_cidr(&params.cidr_block, 16..=28) {
            return Err(BackendError::InvalidParameter(format!(
                "invalid subnet CIDR block: {}",
                params.cidr_block
            )));
        }
        let availability_zone = params
            .availability_zone
            .unwrap_or_else(|| format!("{}a", ctx.scope.region));
        if !availability_zone.starts_with(&ctx.scope.region.to_string()) {
            return Err(BackendError::InvalidParameter(format!(
                "availability zone {availability_zone} is not in {}",
                ctx.scope.region
            )));
        }
        Ok(Self {
            arn: ctx.scope.arn("ec2", &format!("subnet/{id}")),
            id,
            vpc_id: params.vpc_id,
            available_ip_address_count: usable_addresses(&params.cidr_block),
            cidr_block: params.cidr_block,
            availability_zone,
            map_public_ip_on_launch: params.map_public_ip_on_launch.unwrap_or(false),
            tags: params.tags,
        })
    }

    async fn on_create(&mut self, ctx: &SubnetContext) -> Result<(), BackendError> {
        let vpc = match ctx.vpcs.describe(self.vpc_id.clone()).await {
            Ok(vpc) => vpc,
            Err(BackendError::NotFound(_)) => {
                return Err(BackendError::InvalidParameter(format!(
                    "VPC {} does not exist",
                    self.vpc_id
                )))
            }
            Err(e) => return Err(e),
        };
        if vpc.state != VpcState::Available {
            return Err(BackendError::IncorrectState(format!(
                "{} is {}",
                vpc.id, vpc.state
            )));
        }
        Ok(())
    }

    async fn on_update(
        &mut self,
        update: SubnetUpdate,
        _ctx: &SubnetContext,
    ) -> Result<(), BackendError> {
        if let Some(enabled) = update.map_public_ip_on_launch {
            self.map_public_ip_on_launch = enabled;
        }
        Ok(())
    }

    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}
