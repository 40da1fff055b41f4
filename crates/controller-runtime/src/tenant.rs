//! # Tenant Scoping
//!
//! Each (account, region, resource kind) maps to exactly one long-lived
//! manager. [`TenantRegistry`] owns that mapping for one factory; building a
//! manager is synchronous, so a plain `Mutex` is enough and is never held
//! across an `.await`.
//!
//! [`FactoryRegistry`] is the startup-time lookup from a kind to its factory.
//! Factories have different associated types, so they are stored type-erased
//! and recovered by downcasting.

use crate::config::ControllerConfig;
use crate::error::{ResourceError, Result};
use crate::factory::ResourceManagerFactory;
use crate::identifiers::{AccountId, GroupKind, Region};
use crate::manager::Reconciler;
use crate::metrics::Metrics;
use crate::session::Session;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    pub account_id: AccountId,
    pub region: Region,
    pub group_kind: GroupKind,
}

pub struct TenantRegistry<F: ResourceManagerFactory> {
    factory: Arc<F>,
    config: ControllerConfig,
    metrics: Metrics,
    reconciler: Arc<dyn Reconciler>,
    managers: Mutex<HashMap<TenantKey, Arc<F::Manager>>>,
}

impl<F: ResourceManagerFactory> TenantRegistry<F> {
    pub fn new(
        factory: Arc<F>,
        config: ControllerConfig,
        metrics: Metrics,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self {
            factory,
            config,
            metrics,
            reconciler,
            managers: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// Returns the tenant's manager, building it on first use.
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn manager_for(
        &self,
        session: &Session,
        account_id: &AccountId,
        region: &Region,
    ) -> Result<Arc<F::Manager>> {
        let group_kind = self.factory.descriptor().group_kind().clone();
        let key = TenantKey {
            account_id: account_id.clone(),
            region: region.clone(),
            group_kind,
        };

        let mut managers = self.managers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(manager) = managers.get(&key) {
            return Ok(manager.clone());
        }

        let manager = Arc::new(self.factory.manager_for(
            self.config.clone(),
            self.metrics.clone(),
            self.reconciler.clone(),
            session,
            account_id.clone(),
            region.clone(),
        )?);
        info!(kind = %key.group_kind, account = %key.account_id, region = %key.region, "Manager created");
        managers.insert(key, manager.clone());
        Ok(manager)
    }

    pub fn len(&self) -> usize {
        self.managers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object-safe view of a factory, enough to answer policy questions by kind.
pub trait RegisteredFactory: Send + Sync {
    fn group_kind(&self) -> GroupKind;
    fn is_adoptable(&self) -> bool;
    fn requeue_on_success_seconds(&self) -> u64;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<F: ResourceManagerFactory> RegisteredFactory for F {
    fn group_kind(&self) -> GroupKind {
        self.descriptor().group_kind().clone()
    }

    fn is_adoptable(&self) -> bool {
        ResourceManagerFactory::is_adoptable(self)
    }

    fn requeue_on_success_seconds(&self) -> u64 {
        ResourceManagerFactory::requeue_on_success_seconds(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Maps resource kinds to their factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<GroupKind, Arc<dyn RegisteredFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under its kind. Registering a kind twice is a bug.
    pub fn register<F: ResourceManagerFactory>(&mut self, factory: Arc<F>) -> Result<()> {
        let group_kind = RegisteredFactory::group_kind(factory.as_ref());
        if self.factories.contains_key(&group_kind) {
            return Err(ResourceError::invariant(format!(
                "a factory for {group_kind} is already registered"
            )));
        }
        info!(kind = %group_kind, "Factory registered");
        self.factories.insert(group_kind, factory);
        Ok(())
    }

    pub fn get(&self, group_kind: &GroupKind) -> Option<Arc<dyn RegisteredFactory>> {
        self.factories.get(group_kind).cloned()
    }

    /// Recovers the concrete factory registered for `group_kind`.
    pub fn get_typed<F: ResourceManagerFactory>(&self, group_kind: &GroupKind) -> Option<Arc<F>> {
        self.get(group_kind)?.into_any().downcast::<F>().ok()
    }

    pub fn group_kinds(&self) -> impl Iterator<Item = &GroupKind> {
        self.factories.keys()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
