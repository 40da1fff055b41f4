//! Secret lookups for specs that carry sensitive values by reference.

use crate::context::ReconcileContext;
use crate::error::{ResourceError, Result};
use crate::manager::Reconciler;
use crate::resource::ObjectKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Points at one key of a Kubernetes secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyReference {
    /// Defaults to the namespace of the referencing CR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub key: String,
}

impl SecretKeyReference {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            key: key.into(),
        }
    }
}

/// In-process secret storage answering [`Reconciler::secret_value`].
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    secrets: Arc<RwLock<BTreeMap<ObjectKey, BTreeMap<String, String>>>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ObjectKey, data: BTreeMap<String, String>) {
        self.secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, data);
    }
}

#[async_trait]
impl Reconciler for SecretStore {
    async fn secret_value(
        &self,
        ctx: &ReconcileContext,
        namespace: &str,
        reference: &SecretKeyReference,
    ) -> Result<String> {
        ctx.check()?;
        let key = ObjectKey::new(
            reference.namespace.as_deref().unwrap_or(namespace),
            &reference.name,
        );
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        let data = secrets
            .get(&key)
            .ok_or_else(|| ResourceError::not_found(format!("secret {key}")))?;
        // A secret without the key is a spec mistake, not something time will fix.
        data.get(&reference.key).cloned().ok_or_else(|| {
            ResourceError::terminal(format!("secret {key} has no key '{}'", reference.key))
        })
    }
}
