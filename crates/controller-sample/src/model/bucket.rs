//! Object storage buckets.
//!
//! Buckets are addressed by their caller-chosen name, so the ARN can be
//! derived without asking the service.

use crate::backend::{BackendError, RemoteEntity, ServiceScope};
use async_trait::async_trait;
use controller_runtime::{
    CustomResource, GroupKind, ResourceName, ResourceSpec, SecretKeyReference, Tags,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENCRYPTION: &str = "AES256";

/// Length of a customer-provided AES-256 key.
pub const CUSTOMER_KEY_LEN: usize = 32;

/// Desired state of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    /// Server-side encryption algorithm; the service picks one when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Always serialized: an empty list is a request to clear every origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<bool>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    /// Customer-provided encryption key, read from a secret when the bucket is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_key: Option<SecretKeyReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ResourceSpec for BucketSpec {
    type Status = BucketStatus;

    fn group_kind() -> GroupKind {
        GroupKind::new("s3.services.k8s.aws", "Bucket")
    }
}

pub type Bucket = CustomResource<BucketSpec>;

/// Bucket ARNs carry neither region nor account.
pub fn bucket_arn(name: &str) -> ResourceName {
    ResourceName::build("aws", "s3", "", "", name)
}

/// A bucket as the storage service keeps it.
#[derive(Debug, Clone)]
pub struct BucketRecord {
    pub name: String,
    pub arn: ResourceName,
    pub region: String,
    pub encryption: String,
    pub cors_allowed_origins: Vec<String>,
    pub versioning: bool,
    pub tags: Tags,
    /// The key itself is never kept, only that one was supplied.
    pub has_customer_key: bool,
}

#[derive(Clone)]
pub struct BucketCreate {
    pub name: String,
    pub encryption: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub versioning: Option<bool>,
    pub tags: Tags,
    pub customer_key: Option<String>,
}

impl std::fmt::Debug for BucketCreate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketCreate")
            .field("name", &self.name)
            .field("encryption", &self.encryption)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("versioning", &self.versioning)
            .field("tags", &self.tags)
            .field("customer_key", &self.customer_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BucketUpdate {
    pub encryption: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub versioning: Option<bool>,
}

impl BucketUpdate {
    pub fn is_empty(&self) -> bool {
        self.encryption.is_none() && self.cors_allowed_origins.is_none() && self.versioning.is_none()
    }
}

fn valid_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

// The service returns origins sorted, not in the order they were sent.
fn sorted(mut origins: Vec<String>) -> Vec<String> {
    origins.sort();
    origins
}

#[async_trait]
impl RemoteEntity for BucketRecord {
    type Id = String;
    type Create = BucketCreate;
    type Update = BucketUpdate;
    type Context = ServiceScope;

    fn assign_id(_seq: u32, params: &BucketCreate) -> String {
        params.name.clone()
    }

    fn from_create_params(
        id: String,
        params: BucketCreate,
        ctx: &ServiceScope,
    ) -> Result<Self, BackendError> {
        if !valid_name(&id) {
            return Err(BackendError::InvalidParameter(format!(
                "invalid bucket name: {id}"
            )));
        }
        if params
            .customer_key
            .as_ref()
            .is_some_and(|key| key.len() != CUSTOMER_KEY_LEN)
        {
            return Err(BackendError::InvalidParameter(format!(
                "customer key must be {CUSTOMER_KEY_LEN} bytes"
            )));
        }
        Ok(Self {
            arn: bucket_arn(&id),
            name: id,
            region: ctx.region.to_string(),
            encryption: params
                .encryption
                .unwrap_or_else(|| DEFAULT_ENCRYPTION.to_string()),
            cors_allowed_origins: sorted(params.cors_allowed_origins),
            versioning: params.versioning.unwrap_or(false),
            tags: params.tags,
            has_customer_key: params.customer_key.is_some(),
        })
    }

    async fn on_update(
        &mut self,
        update: BucketUpdate,
        _ctx: &ServiceScope,
    ) -> Result<(), BackendError> {
        if let Some(encryption) = update.encryption {
            if !matches!(encryption.as_str(), "AES256" | "aws:kms") {
                return Err(BackendError::InvalidParameter(format!(
                    "unsupported encryption: {encryption}"
                )));
            }
            self.encryption = encryption;
        }
        if let Some(origins) = update.cors_allowed_origins {
            self.cors_allowed_origins = sorted(origins);
        }
        if let Some(versioning) = update.versioning {
            self.versioning = versioning;
        }
        Ok(())
    }

    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}
