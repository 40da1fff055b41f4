//! # Resource Managers
//!
//! One [`ResourceManager`](controller_runtime::ResourceManager) and one
//! [`ResourceManagerFactory`](controller_runtime::ResourceManagerFactory) per
//! resource type. Managers translate between custom resources and the
//! simulated services; every remote call goes through
//! [`ManagerScope::call`](controller_runtime::ManagerScope::call) so it is
//! cancellable and counted.
//!
//! | Type | Addressed by | Late-initialized | Adoptable | Converges |
//! |------|--------------|------------------|-----------|-----------|
//! | [`Bucket`](crate::model::Bucket) | name, then ARN | `encryption`, `versioning` | yes | immediately |
//! | [`Vpc`](crate::model::Vpc) | ID, then `Name` tag (`namespace/name`) | `instance_tenancy`, `enable_dns_support` | yes | after provisioning |
//! | [`Subnet`](crate::model::Subnet) | ID, then `Name` tag (`namespace/name`) | `availability_zone`, `map_public_ip_on_launch` | no | immediately |

pub mod bucket;
pub mod subnet;
pub mod vpc;

pub use bucket::{BucketManager, BucketManagerFactory};
pub use subnet::{SubnetManager, SubnetManagerFactory};
pub use vpc::{VpcManager, VpcManagerFactory};

use crate::model::NAME_TAG;
use controller_runtime::tags::{self, ServiceControllerMetadata, Tags};
use controller_runtime::{
    ControllerConfig, CustomResource, Delta, FieldPath, ObjectKey, ResourceError,
    ResourceIdentifiers, ResourceSpec, Result,
};

/// Fails with an invariant violation when `delta` touches a field outside `updatable`.
pub(crate) fn ensure_updatable(delta: &Delta, updatable: &[&str]) -> Result<()> {
    let allowed: Vec<FieldPath> = updatable.iter().map(|p| FieldPath::from(*p)).collect();
    let immutable: Vec<String> = delta
        .differences()
        .iter()
        .filter(|d| !allowed.iter().any(|p| d.path.has_prefix(p)))
        .map(|d| d.path.to_string())
        .collect();
    if immutable.is_empty() {
        Ok(())
    } else {
        Err(ResourceError::invariant(format!(
            "cannot update {} in place",
            immutable.join(", ")
        )))
    }
}

/// The tags to write so the remote resource carries both the user's tags and
/// the controller's, given what it carries now.
pub(crate) fn tags_to_write(
    config: &ControllerConfig,
    metadata: &ServiceControllerMetadata,
    key: &ObjectKey,
    existing: &Tags,
    desired: &Tags,
) -> Tags {
    let owned = tags::controller_tags(&config.resource_tags, metadata, key);
    let target = tags::ensure(existing, desired, &owned);
    tags::missing(existing, &target)
}

/// Assembles the observed resource: `desired`'s metadata and conditions,
/// the remote spec and status, and the identifiers the service reported.
pub(crate) fn observed<S: ResourceSpec>(
    desired: &CustomResource<S>,
    spec: S,
    identifiers: &ResourceIdentifiers,
    fields: S::Status,
) -> CustomResource<S> {
    let mut latest = CustomResource::new(desired.meta.clone(), spec);
    latest.status.conditions = desired.status.conditions.clone();
    latest.status.identifiers = desired.identifiers().clone();
    latest.status.identifiers.merge_generated(identifiers);
    latest.status.fields = fields;
    latest
}

/// The `Name` tag a tag-addressed resource carries: the recorded name, else
/// the user's own `Name` tag, else the CR's `namespace/name` key. Equal names
/// in different namespaces therefore never address the same resource.
pub(crate) fn name_tag<S: ResourceSpec>(resource: &CustomResource<S>, tags: &Tags) -> String {
    resource
        .identifiers()
        .name
        .clone()
        .or_else(|| tags.get(NAME_TAG).cloned())
        .unwrap_or_else(|| resource.key().to_string())
}

/// Picks the one record carrying `name`; several is a user error.
pub(crate) fn find_named<T>(
    records: Vec<T>,
    name: &str,
    name_of: impl Fn(&T) -> Option<&str>,
) -> Result<T> {
    let mut matching = records.into_iter().filter(|r| name_of(r) == Some(name));
    match (matching.next(), matching.next()) {
        (Some(record), None) => Ok(record),
        (None, _) => Err(ResourceError::not_found(format!("no resource named {name}"))),
        (Some(_), Some(_)) => Err(ResourceError::terminal(format!(
            "more than one resource is named {name}"
        ))),
    }
}
