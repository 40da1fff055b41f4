//! # Delta
//!
//! A [`Delta`] is the structured answer to "how does desired differ from
//! latest?". It is computed fresh on every pass by
//! [`compare`](crate::compare), consumed immediately by the reconciler, and
//! handed unchanged to `ResourceManager::update` so managers never re-derive
//! the diff themselves.
//!
//! Only *significant* differences count towards [`Delta::is_empty`].
//! Insignificant ones (server defaults the user never set) are kept in
//! [`Delta::ignored`] so a pass can still be audited.

use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

/// Dotted path to a field, e.g. `Spec.Tags` or `Spec.Rules.Expiration`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    /// True if `self` is `prefix` or lies below it.
    pub fn has_prefix(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Looks the path up inside a JSON document.
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(value, |current, segment| current.get(segment))
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        Self(
            s.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl FromStr for FieldPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Why a difference does not require a remote update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Insignificance {
    /// The user left the field unset and the remote system assigned a value.
    ServerDefault,
}

/// A single field-level difference between desired and latest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Difference {
    pub path: FieldPath,
    /// Value in desired state; `None` when absent or null.
    pub desired: Option<Value>,
    /// Value in the latest observed state; `None` when absent or null.
    pub latest: Option<Value>,
}

impl Difference {
    pub fn new(path: FieldPath, desired: Option<Value>, latest: Option<Value>) -> Self {
        Self {
            path,
            desired: desired.filter(|v| !v.is_null()),
            latest: latest.filter(|v| !v.is_null()),
        }
    }
}

/// The ordered set of differences between desired and latest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delta {
    differences: Vec<Difference>,
    ignored: Vec<(Difference, Insignificance)>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a significant difference.
    pub fn add(&mut self, difference: Difference) {
        self.differences.push(difference);
    }

    /// Records a difference that does not require a remote update.
    pub fn ignore(&mut self, difference: Difference, reason: Insignificance) {
        self.ignored.push((difference, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.differences.len()
    }

    pub fn differences(&self) -> &[Difference] {
        &self.differences
    }

    pub fn ignored(&self) -> &[(Difference, Insignificance)] {
        &self.ignored
    }

    pub fn paths(&self) -> Vec<&FieldPath> {
        self.differences.iter().map(|d| &d.path).collect()
    }

    /// True if any significant difference lies at or below `path`.
    pub fn different_at(&self, path: impl Into<FieldPath>) -> bool {
        let path = path.into();
        self.differences.iter().any(|d| d.path.has_prefix(&path))
    }

    /// True if any significant difference lies outside all of `paths`.
    pub fn different_except(&self, paths: &[FieldPath]) -> bool {
        self.differences
            .iter()
            .any(|d| !paths.iter().any(|p| d.path.has_prefix(p)))
    }
}
