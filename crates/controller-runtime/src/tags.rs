//! # Controller Tags
//!
//! Managers stamp remote resources with tags that identify the controller
//! that owns them. [`ensure`] computes the tag set to write back: it
//! (re)applies the tags the controller owns and leaves every other tag as it
//! found it, so applying it twice changes nothing the second time.
//!
//! Configured tag values may reference a few variables that are expanded per
//! resource:
//!
//! | Variable | Expands to |
//! |----------|------------|
//! | `%CONTROLLER_SERVICE%` | service alias, e.g. `s3` |
//! | `%CONTROLLER_VERSION%` | controller version |
//! | `%K8S_NAMESPACE%` | namespace of the CR |
//! | `%K8S_RESOURCE_NAME%` | name of the CR |

use crate::resource::ObjectKey;
use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

/// Controller-wide identification used when tagging resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceControllerMetadata {
    pub service_alias: String,
    pub service_api_group: String,
    pub service_api_version: String,
    pub version: String,
    pub git_commit: String,
    /// Tag key whose value names the managing controller.
    pub managed_by_key: String,
}

impl ServiceControllerMetadata {
    pub fn new(service_alias: impl Into<String>, version: impl Into<String>) -> Self {
        let service_alias = service_alias.into();
        Self {
            service_api_group: format!("{service_alias}.services.k8s.aws"),
            service_alias,
            service_api_version: "v1alpha1".to_string(),
            version: version.into(),
            git_commit: String::new(),
            managed_by_key: "services.k8s.aws/managed-by".to_string(),
        }
    }

    pub fn managed_by_value(&self) -> String {
        format!("{}-controller", self.service_alias)
    }
}

/// Expands the `%VAR%` placeholders in `template`.
pub fn expand(template: &str, metadata: &ServiceControllerMetadata, key: &ObjectKey) -> String {
    template
        .replace("%CONTROLLER_SERVICE%", &metadata.service_alias)
        .replace("%CONTROLLER_VERSION%", &metadata.version)
        .replace("%K8S_NAMESPACE%", &key.namespace)
        .replace("%K8S_RESOURCE_NAME%", &key.name)
}

/// The tags the controller owns for the resource at `key`.
///
/// `templates` are `key=value` strings as found in the controller config;
/// malformed entries are skipped (config validation rejects them earlier).
pub fn controller_tags(
    templates: &[String],
    metadata: &ServiceControllerMetadata,
    key: &ObjectKey,
) -> Tags {
    let mut tags: Tags = templates
        .iter()
        .filter_map(|t| t.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), expand(v.trim(), metadata, key)))
        .filter(|(k, _)| !k.is_empty())
        .collect();
    tags.insert(metadata.managed_by_key.clone(), metadata.managed_by_value());
    tags
}

/// Merges owned tags into `existing`.
///
/// User-specified tags (`desired`) win over controller defaults for the same
/// key; any tag present on the resource that the controller does not own is
/// kept untouched.
pub fn ensure(existing: &Tags, desired: &Tags, owned: &Tags) -> Tags {
    let mut merged = existing.clone();
    for (k, v) in owned {
        if !desired.contains_key(k) {
            merged.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in desired {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Tags that must be written for `existing` to match [`ensure`]'s output.
pub fn missing(existing: &Tags, target: &Tags) -> Tags {
    target
        .iter()
        .filter(|(k, v)| existing.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
