//! Virtual networks.
//!
//! A VPC gets its identifier from the service at creation time and stays
//! `pending` until provisioning finishes.

use crate::backend::{BackendError, RemoteEntity, ServiceScope};
use async_trait::async_trait;
use controller_runtime::{CustomResource, GroupKind, ResourceName, ResourceSpec, Tags};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::time::Instant;

/// Tag holding the human-readable name of a VPC.
pub const NAME_TAG: &str = "Name";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcSpec {
    pub cidr_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_tenancy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_dns_support: Option<bool>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl ResourceSpec for VpcSpec {
    type Status = VpcStatus;

    fn group_kind() -> GroupKind {
        GroupKind::new("ec2.services.k8s.aws", "VPC")
    }
}

pub type Vpc = CustomResource<VpcSpec>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VpcId(pub String);

impl Display for VpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VpcId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpcState {
    Pending,
    Available,
}

impl Display for VpcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VpcState::Pending => write!(f, "pending"),
            VpcState::Available => write!(f, "available"),
        }
    }
}

/// A VPC as the network service keeps it.
#[derive(Debug, Clone)]
pub struct VpcRecord {
    pub id: VpcId,
    pub arn: ResourceName,
    pub owner_id: String,
    pub cidr_block: String,
    pub instance_tenancy: String,
    pub enable_dns_support: bool,
    pub state: VpcState,
    pub tags: Tags,
    ready_at: Instant,
}

impl VpcRecord {
    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct VpcCreate {
    pub cidr_block: String,
    pub instance_tenancy: Option<String>,
    pub enable_dns_support: Option<bool>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default)]
pub struct VpcUpdate {
    pub instance_tenancy: Option<String>,
    pub enable_dns_support: Option<bool>,
}

/// Accepts `a.b.c.d/n` with a prefix the service allows for the given kind.
pub(crate) fn valid_cidr(cidr: &str, prefixes: std::ops::RangeInclusive<u8>) -> bool {
    let Some((address, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let octets: Vec<&str> = address.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| o.parse::<u8>().is_ok())
        && prefix.parse::<u8>().is_ok_and(|p| prefixes.contains(&p))
}

fn valid_tenancy(tenancy: &str) -> bool {
    matches!(tenancy, "default" | "dedicated")
}

#[async_trait]
impl RemoteEntity for VpcRecord {
    type Id = VpcId;
    type Create = VpcCreate;
    type Update = VpcUpdate;
    type Context = ServiceScope;

    fn assign_id(seq: u32, _params: &VpcCreate) -> VpcId {
        VpcId(format!("vpc-{seq:08x}"))
    }

    fn from_create_params(
        id: VpcId,
        params: VpcCreate,
        ctx: &ServiceScope,
    ) -> Result<Self, BackendError> {
        if !valid_cidr(&params.cidr_block, 16..=28) {
            return Err(BackendError::InvalidParameter(format!(
                "invalid VPC CIDR block: {}",
                params.cidr_block
            )));
        }
        let instance_tenancy = params
            .instance_tenancy
            .unwrap_or_else(|| "default".to_string());
        if !valid_tenancy(&instance_tenancy) {
            return Err(BackendError::InvalidParameter(format!(
                "invalid tenancy: {instance_tenancy}"
            )));
        }
        let state = if ctx.provisioning_delay.is_zero() {
            VpcState::Available
        } else {
            VpcState::Pending
        };
        Ok(Self {
            arn: ctx.arn("ec2", &format!("vpc/{id}")),
            id,
            owner_id: ctx.account_id.to_string(),
            cidr_block: params.cidr_block,
            instance_tenancy,
            enable_dns_support: params.enable_dns_support.unwrap_or(true),
            state,
            tags: params.tags,
            ready_at: Instant::now() + ctx.provisioning_delay,
        })
    }

    async fn on_update(&mut self, update: VpcUpdate, _ctx: &ServiceScope) -> Result<(), BackendError> {
        if self.state != VpcState::Available {
            return Err(BackendError::IncorrectState(format!(
                "{} is {}",
                self.id, self.state
            )));
        }
        if let Some(tenancy) = update.instance_tenancy {
            if !valid_tenancy(&tenancy) {
                return Err(BackendError::InvalidParameter(format!(
                    "invalid tenancy: {tenancy}"
                )));
            }
            self.instance_tenancy = tenancy;
        }
        if let Some(enabled) = update.enable_dns_support {
            self.enable_dns_support = enabled;
        }
        Ok(())
    }

    fn refresh(&mut self, now: Instant) {
        if self.state == VpcState::Pending && now >= self.ready_at {
            self.state = VpcState::Available;
        }
    }

    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}
