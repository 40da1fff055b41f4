//! # Delta Engine
//!
//! [`ComparisonPolicy`] is the one place that answers "are desired and latest
//! equivalent?" for a resource type. Each type lists the fields it considers
//! comparable; anything not listed (output-only fields, server-managed
//! fields) is never looked at, so it can never produce false-positive drift.
//!
//! Both sides are serialized with serde and walked as JSON:
//!
//! - nested objects recurse and report the deepest differing key,
//! - arrays are compared as a whole, either in order or as multisets,
//! - numbers compare by value (`10` equals `10.0`); two integers compare
//!   exactly, without a detour through `f64`,
//! - a [`Normalization`] is applied identically to both sides first.
//!
//! A field the user left unset but the remote system filled in is recorded as
//! [`Insignificance::ServerDefault`] rather than as drift, at any depth; late
//! initialization copies those values into desired state. A rule marked
//! [`FieldRule::exact_keys`] owns every key of its object instead, so extra
//! remote keys there are drift.

use crate::delta::{Delta, Difference, FieldPath, Insignificance};
use crate::error::{ResourceError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Whether element order matters when comparing a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionOrder {
    #[default]
    Ordered,
    Unordered,
}

/// Canonicalization applied to both sides before comparison.
#[derive(Debug, Clone, Copy, Default)]
pub enum Normalization {
    #[default]
    None,
    /// Lowercases every string in the field.
    CaseInsensitive,
    /// Strips surrounding whitespace from every string in the field.
    Trim,
    Custom(fn(&Value) -> Value),
}

impl Normalization {
    fn apply(&self, value: &Value) -> Value {
        match self {
            Self::None => value.clone(),
            Self::CaseInsensitive => map_strings(value, &|s| s.to_lowercase()),
            Self::Trim => map_strings(value, &|s| s.trim().to_string()),
            Self::Custom(f) => f(value),
        }
    }
}

fn map_strings(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), map_strings(v, f)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// How one comparable field is compared.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub path: FieldPath,
    pub order: CollectionOrder,
    pub normalize: Normalization,
    pub exact_keys: bool,
}

impl FieldRule {
    pub fn new(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            order: CollectionOrder::default(),
            normalize: Normalization::default(),
            exact_keys: false,
        }
    }

    pub fn unordered(mut self) -> Self {
        self.order = CollectionOrder::Unordered;
        self
    }

    pub fn normalized(mut self, normalize: Normalization) -> Self {
        self.normalize = normalize;
        self
    }

    /// Keys present only remotely inside this object are drift, as for a
    /// tag map the user owns in full.
    pub fn exact_keys(mut self) -> Self {
        self.exact_keys = true;
        self
    }
}

/// The per-type list of comparable fields.
#[derive(Debug, Clone, Default)]
pub struct ComparisonPolicy {
    rules: Vec<FieldRule>,
}

impl ComparisonPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain field compared in order without normalization.
    pub fn field(self, path: impl Into<FieldPath>) -> Self {
        self.rule(FieldRule::new(path))
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn is_comparable(&self, path: &FieldPath) -> bool {
        self.rules.iter().any(|r| path.has_prefix(&r.path))
    }

    /// Serializes both sides and compares them.
    pub fn compare<S: Serialize>(&self, desired: &S, latest: &S) -> Result<Delta> {
        let to_value = |side: &S| {
            serde_json::to_value(side).map_err(|e| {
                ResourceError::invariant(format!("resource is not serializable: {e}"))
            })
        };
        Ok(self.compare_values(&to_value(desired)?, &to_value(latest)?))
    }

    pub fn compare_values(&self, desired: &Value, latest: &Value) -> Delta {
        let mut delta = Delta::new();
        for rule in &self.rules {
            let side = |doc: &Value| {
                rule.path
                    .lookup(doc)
                    .filter(|v| !v.is_null())
                    .map(|v| rule.normalize.apply(v))
            };
            match (side(desired), side(latest)) {
                (None, None) => {}
                (None, Some(latest)) => delta.ignore(
                    Difference::new(rule.path.clone(), None, Some(latest)),
                    Insignificance::ServerDefault,
                ),
                (Some(desired), latest) => {
                    walk(rule, rule.path.clone(), &desired, latest.as_ref(), &mut delta)
                }
            }
        }
        delta
    }
}

fn walk(
    rule: &FieldRule,
    path: FieldPath,
    desired: &Value,
    latest: Option<&Value>,
    delta: &mut Delta,
) {
    match (desired, latest) {
        (Value::Object(d), Some(Value::Object(l))) => walk_objects(rule, path, d, l, delta),
        (desired, Some(latest)) if values_equal(desired, latest, rule.order) => {}
        (desired, latest) => delta.add(Difference::new(
            path,
            Some(desired.clone()),
            latest.cloned(),
        )),
    }
}

fn walk_objects(
    rule: &FieldRule,
    path: FieldPath,
    desired: &Map<String, Value>,
    latest: &Map<String, Value>,
    delta: &mut Delta,
) {
    let keys: BTreeSet<&String> = desired.keys().chain(latest.keys()).collect();
    for key in keys {
        let child = path.child(key.as_str());
        let d = desired.get(key).filter(|v| !v.is_null());
        let l = latest.get(key).filter(|v| !v.is_null());
        match (d, l) {
            (None, None) => {}
            (None, Some(l)) if rule.exact_keys => {
                delta.add(Difference::new(child, None, Some(l.clone())))
            }
            (None, Some(l)) => delta.ignore(
                Difference::new(child, None, Some(l.clone())),
                Insignificance::ServerDefault,
            ),
            (Some(d), l) => walk(rule, child, d, l, delta),
        }
    }
}

fn values_equal(a: &Value, b: &Value, order: CollectionOrder) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => x == y,
            }
        }
        (Value::Number(x), Value::Number(y)) => {
            x.as_i64() == y.as_i64() && x.as_u64() == y.as_u64()
        }
        (Value::Array(x), Value::Array(y)) if x.len() == y.len() => match order {
            CollectionOrder::Ordered => x
                .iter()
                .zip(y)
                .all(|(a, b)| values_equal(a, b, order)),
            CollectionOrder::Unordered => multiset_equal(x, y),
        },
        (Value::Object(x), Value::Object(y)) => {
            let present = |m: &Map<String, Value>| -> BTreeSet<String> {
                m.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.clone())
                    .collect()
            };
            present(x) == present(y)
                && x.iter().filter(|(_, v)| !v.is_null()).all(|(k, v)| {
                    y.get(k).is_some_and(|w| values_equal(v, w, order))
                })
        }
        _ => a == b,
    }
}

fn multiset_equal(x: &[Value], y: &[Value]) -> bool {
    let mut used = vec![false; y.len()];
    x.iter().all(|a| {
        let found = y.iter().enumerate().find(|(i, b)| {
            !used.get(*i).copied().unwrap_or(true)
                && values_equal(a, b, CollectionOrder::Unordered)
        });
        match found {
            Some((i, _)) => {
                if let Some(slot) = used.get_mut(i) {
                    *slot = true;
                }
                true
            }
            None => false,
        }
    })
}
