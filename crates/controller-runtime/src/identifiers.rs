//! # Identity Model
//!
//! A remote resource can be addressed three ways, and which ones are available
//! depends on both the resource type and where it is in its lifecycle:
//!
//! - **ARN** ([`ResourceName`]): globally unique, assigned once the resource exists.
//! - **ID**: generated by the remote service, usually but not always unique.
//! - **Name**: supplied by the user, uniqueness scope depends on the type.
//!
//! Before creation all three may be empty. Once the remote system has handed
//! out an ARN or ID, [`ResourceIdentifiers::address`] prefers it over the name.

use crate::error::{ResourceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Cloud account that owns remote resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Region a tenant operates in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub String);

impl Region {
    pub fn new(region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(ResourceError::terminal("region must not be empty"));
        }
        Ok(Self(region))
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(region: &str) -> Self {
        Self(region.to_string())
    }
}

/// Globally unique resource name (ARN).
///
/// Format: `arn:{partition}:{service}:{region}:{account}:{resource}`. Region and
/// account may be empty for global services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(String);

/// The components of a parsed [`ResourceName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNameParts<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account: &'a str,
    pub resource: &'a str,
}

impl ResourceName {
    pub fn build(
        partition: &str,
        service: &str,
        region: &str,
        account: &str,
        resource: &str,
    ) -> Self {
        Self(format!(
            "arn:{partition}:{service}:{region}:{account}:{resource}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> Result<ResourceNameParts<'_>> {
        // The resource segment may itself contain ':' so only split five times.
        let mut segments = self.0.splitn(6, ':');
        let mut next = || segments.next();
        match (next(), next(), next(), next(), next(), next()) {
            (Some("arn"), Some(partition), Some(service), Some(region), Some(account), Some(resource))
                if !partition.is_empty() && !service.is_empty() && !resource.is_empty() =>
            {
                Ok(ResourceNameParts {
                    partition,
                    service,
                    region,
                    account,
                    resource,
                })
            }
            _ => Err(ResourceError::terminal(format!(
                "malformed resource name: {}",
                self.0
            ))),
        }
    }
}

impl FromStr for ResourceName {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        let name = Self(s.to_string());
        name.parts()?;
        Ok(name)
    }
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// All the ways to reference a remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<ResourceName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The identifier a manager should use to address a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Arn(ResourceName),
    Id(String),
    Name(String),
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Arn(arn) => write!(f, "arn={arn}"),
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}

impl ResourceIdentifiers {
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arn.is_none() && self.name.is_none() && self.id.is_none()
    }

    /// Whether the remote system has assigned an identifier yet.
    pub fn has_generated(&self) -> bool {
        self.arn.is_some() || self.id.is_some()
    }

    /// Preferred address: ARN, then ID, then Name.
    pub fn address(&self) -> Option<Address> {
        let non_empty = |s: &&String| !s.is_empty();
        if let Some(arn) = &self.arn {
            return Some(Address::Arn(arn.clone()));
        }
        if let Some(id) = self.id.as_ref().filter(non_empty) {
            return Some(Address::Id(id.clone()));
        }
        self.name
            .as_ref()
            .filter(non_empty)
            .map(|name| Address::Name(name.clone()))
    }

    /// Copies generated identifiers from `observed`, keeping any user-supplied name.
    pub fn merge_generated(&mut self, observed: &ResourceIdentifiers) {
        if observed.arn.is_some() {
            self.arn = observed.arn.clone();
        }
        if observed.id.is_some() {
            self.id = observed.id.clone();
        }
        if self.name.is_none() {
            self.name = observed.name.clone();
        }
    }
}

/// API group + kind of a custom resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.group)
    }
}

/// Metadata overrides applied when materializing a resource of another kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Identifies a custom resource type, with optional metadata overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetKubernetesResource {
    group: String,
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<PartialObjectMeta>,
}

#[derive(Deserialize)]
struct RawTarget {
    group: Option<String>,
    kind: Option<String>,
    metadata: Option<PartialObjectMeta>,
}

impl TargetKubernetesResource {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        metadata: Option<PartialObjectMeta>,
    ) -> Result<Self> {
        let (group, kind) = (group.into(), kind.into());
        if group.is_empty() || kind.is_empty() {
            return Err(ResourceError::terminal(
                "target resource requires both group and kind",
            ));
        }
        Ok(Self {
            group,
            kind,
            metadata,
        })
    }

    /// Parses a target from JSON, rejecting a missing group or kind.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let raw: RawTarget = serde_json::from_value(value)
            .map_err(|e| ResourceError::terminal(format!("invalid target resource: {e}")))?;
        match (raw.group, raw.kind) {
            (Some(group), Some(kind)) => Self::new(group, kind, raw.metadata),
            _ => Err(ResourceError::terminal(
                "target resource requires both group and kind",
            )),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn metadata(&self) -> Option<&PartialObjectMeta> {
        self.metadata.as_ref()
    }
}
