//! # Mock Resource Manager
//!
//! [`MockResourceManager`] implements [`ResourceManager`] from a queue of
//! expectations, so reconciler behaviour can be tested without any remote
//! system. Expectations are consumed strictly in order; a call that does not
//! match the next expectation panics, which is how tests assert that an
//! operation (say, `update` on an empty delta) is *never* invoked.
//!
//! ```ignore
//! let mock = MockResourceManager::<Bucket>::new();
//! mock.expect_resolve_references().return_input();
//! mock.expect_read_one().return_err(ResourceError::not_found("bucket-a"));
//! mock.expect_create().return_ok(created);
//! // ...
//! mock.verify(); // every expectation was consumed
//! ```
//!
//! [`MockFactory`] hands out clones of one mock (they share the queue) and
//! counts how often it was asked to build a manager.

use crate::compare::ComparisonPolicy;
use crate::config::ControllerConfig;
use crate::context::ReconcileContext;
use crate::delta::Delta;
use crate::error::{ResourceError, Result};
use crate::factory::{ManagerScope, ResourceDescriptor, ResourceManagerFactory};
use crate::identifiers::{AccountId, Region, ResourceName};
use crate::manager::{Reconciler, ResourceManager};
use crate::metrics::Metrics;
use crate::reader::ReferenceReader;
use crate::resource::{CustomResource, ResourceSpec};
use crate::session::Session;
use crate::tags::ServiceControllerMetadata;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// The manager operations a mock can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadOne,
    Create,
    Update,
    Delete,
    LateInitialize,
    ResolveReferences,
    IsSynced,
    EnsureTags,
}

enum Reply<S: ResourceSpec> {
    Resource(Result<CustomResource<S>>),
    /// Echo the resource the operation was called with.
    Input,
    Bool(Result<bool>),
    Unit(Result<()>),
}

struct Expectation<S: ResourceSpec> {
    operation: Operation,
    reply: Reply<S>,
}

type Queue<S> = Arc<Mutex<VecDeque<Expectation<S>>>>;

pub struct MockResourceManager<S: ResourceSpec> {
    expectations: Queue<S>,
    calls: Arc<Mutex<Vec<Operation>>>,
    deltas: Arc<Mutex<Vec<Delta>>>,
    arn_rule: Option<fn(&str) -> Option<ResourceName>>,
}

impl<S: ResourceSpec> Clone for MockResourceManager<S> {
    fn clone(&self) -> Self {
        Self {
            expectations: self.expectations.clone(),
            calls: self.calls.clone(),
            deltas: self.deltas.clone(),
            arn_rule: self.arn_rule,
        }
    }
}

impl<S: ResourceSpec> Default for MockResourceManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ResourceSpec> MockResourceManager<S> {
    /// Creates a mock with no expectations.
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            deltas: Arc::new(Mutex::new(Vec::new())),
            arn_rule: None,
        }
    }

    /// Uses `rule` to answer `arn_from_name`; without one the mock derives nothing.
    pub fn with_arn_rule(mut self, rule: fn(&str) -> Option<ResourceName>) -> Self {
        self.arn_rule = Some(rule);
        self
    }

    pub fn expect_read_one(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::ReadOne)
    }

    pub fn expect_create(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::Create)
    }

    pub fn expect_update(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::Update)
    }

    pub fn expect_delete(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::Delete)
    }

    pub fn expect_late_initialize(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::LateInitialize)
    }

    pub fn expect_resolve_references(&self) -> ResourceExpectation<S> {
        self.resource_expectation(Operation::ResolveReferences)
    }

    pub fn expect_is_synced(&self) -> SyncedExpectation<S> {
        SyncedExpectation {
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_ensure_tags(&self) -> TagsExpectation<S> {
        TagsExpectation {
            expectations: self.expectations.clone(),
        }
    }

    /// Every operation invoked so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn was_called(&self, operation: Operation) -> bool {
        self.calls().contains(&operation)
    }

    /// The deltas `update` was invoked with.
    pub fn update_deltas(&self) -> Vec<Delta> {
        self.deltas.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Panics unless every expectation was consumed.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        if !exps.is_empty() {
            let pending: Vec<Operation> = exps.iter().map(|e| e.operation).collect();
            panic!(
                "Not all expectations were met. {} remaining: {:?}",
                exps.len(),
                pending
            );
        }
    }

    fn resource_expectation(&self, operation: Operation) -> ResourceExpectation<S> {
        ResourceExpectation {
            operation,
            expectations: self.expectations.clone(),
        }
    }

    fn next(&self, operation: Operation) -> Reply<S> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation);
        let expectation = self
            .expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match expectation {
            Some(e) if e.operation == operation => e.reply,
            Some(e) => panic!(
                "Unexpected {:?} call, next expectation is {:?}",
                operation, e.operation
            ),
            None => panic!("Unexpected {operation:?} call, no expectations left"),
        }
    }

    fn reply_resource(
        &self,
        operation: Operation,
        input: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        match self.next(operation) {
            Reply::Resource(result) => result,
            Reply::Input => Ok(input.clone()),
            _ => panic!("{operation:?} expectation does not return a resource"),
        }
    }
}

/// Builder for operations that return a resource.
pub struct ResourceExpectation<S: ResourceSpec> {
    operation: Operation,
    expectations: Queue<S>,
}

impl<S: ResourceSpec> ResourceExpectation<S> {
    pub fn return_ok(self, resource: CustomResource<S>) {
        self.push(Reply::Resource(Ok(resource)));
    }

    pub fn return_err(self, error: ResourceError) {
        self.push(Reply::Resource(Err(error)));
    }

    /// Returns whatever resource the operation was called with.
    pub fn return_input(self) {
        self.push(Reply::Input);
    }

    fn push(self, reply: Reply<S>) {
        let mut exps = self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        exps.push_back(Expectation {
            operation: self.operation,
            reply,
        });
    }
}

/// Builder for `is_synced` expectations.
pub struct SyncedExpectation<S: ResourceSpec> {
    expectations: Queue<S>,
}

impl<S: ResourceSpec> SyncedExpectation<S> {
    pub fn return_ok(self, synced: bool) {
        self.push(Ok(synced));
    }

    pub fn return_err(self, error: ResourceError) {
        self.push(Err(error));
    }

    fn push(self, result: Result<bool>) {
        let mut exps = self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        exps.push_back(Expectation {
            operation: Operation::IsSynced,
            reply: Reply::Bool(result),
        });
    }
}

/// Builder for `ensure_tags` expectations.
pub struct TagsExpectation<S: ResourceSpec> {
    expectations: Queue<S>,
}

impl<S: ResourceSpec> TagsExpectation<S> {
    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    pub fn return_err(self, error: ResourceError) {
        self.push(Err(error));
    }

    fn push(self, result: Result<()>) {
        let mut exps = self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        exps.push_back(Expectation {
            operation: Operation::EnsureTags,
            reply: Reply::Unit(result),
        });
    }
}

#[async_trait]
impl<S: ResourceSpec> ResourceManager for MockResourceManager<S> {
    type Spec = S;

    async fn read_one(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.reply_resource(Operation::ReadOne, desired)
    }

    async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.reply_resource(Operation::Create, desired)
    }

    async fn update(
        &self,
        ctx: &ReconcileContext,
        desired: &CustomResource<S>,
        _latest: &CustomResource<S>,
        delta: &Delta,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.deltas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delta.clone());
        self.reply_resource(Operation::Update, desired)
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        latest: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.reply_resource(Operation::Delete, latest)
    }

    fn arn_from_name(&self, name: &str) -> Option<ResourceName> {
        self.arn_rule.and_then(|rule| rule(name))
    }

    async fn late_initialize(
        &self,
        ctx: &ReconcileContext,
        resource: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.reply_resource(Operation::LateInitialize, resource)
    }

    async fn resolve_references(
        &self,
        ctx: &ReconcileContext,
        _reader: &dyn ReferenceReader,
        resource: &CustomResource<S>,
    ) -> Result<CustomResource<S>> {
        ctx.check()?;
        self.reply_resource(Operation::ResolveReferences, resource)
    }

    async fn is_synced(&self, ctx: &ReconcileContext, _resource: &CustomResource<S>) -> Result<bool> {
        ctx.check()?;
        match self.next(Operation::IsSynced) {
            Reply::Bool(result) => result,
            _ => panic!("IsSynced expectation does not return a bool"),
        }
    }

    async fn ensure_tags(
        &self,
        ctx: &ReconcileContext,
        _resource: &CustomResource<S>,
        _metadata: &ServiceControllerMetadata,
    ) -> Result<()> {
        ctx.check()?;
        match self.next(Operation::EnsureTags) {
            Reply::Unit(result) => result,
            _ => panic!("EnsureTags expectation does not return ()"),
        }
    }
}

/// A factory whose managers are clones of one [`MockResourceManager`].
pub struct MockFactory<S: ResourceSpec> {
    mock: MockResourceManager<S>,
    policy: ComparisonPolicy,
    adoptable: bool,
    requeue_on_success_seconds: u64,
    builds: AtomicUsize,
}

impl<S: ResourceSpec> MockFactory<S> {
    pub fn new(mock: MockResourceManager<S>, policy: ComparisonPolicy) -> Self {
        Self {
            mock,
            policy,
            adoptable: false,
            requeue_on_success_seconds: 0,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn adoptable(mut self, adoptable: bool) -> Self {
        self.adoptable = adoptable;
        self
    }

    pub fn requeue_on_success(mut self, seconds: u64) -> Self {
        self.requeue_on_success_seconds = seconds;
        self
    }

    /// How many managers `manager_for` has built successfully.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl<S: ResourceSpec> ResourceManagerFactory for MockFactory<S> {
    type Manager = MockResourceManager<S>;

    fn descriptor(&self) -> ResourceDescriptor<S> {
        ResourceDescriptor::new(self.policy.clone())
    }

    fn manager_for(
        &self,
        config: ControllerConfig,
        metrics: Metrics,
        reconciler: Arc<dyn Reconciler>,
        session: &Session,
        account_id: AccountId,
        region: Region,
    ) -> Result<Self::Manager> {
        ManagerScope::new(
            &S::group_kind(),
            config,
            metrics,
            reconciler,
            session,
            account_id,
            region,
        )?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.mock.clone())
    }

    fn is_adoptable(&self) -> bool {
        self.adoptable
    }

    fn requeue_on_success_seconds(&self) -> u64 {
        self.requeue_on_success_seconds
    }
}
