//! # Remote Entity Trait
//!
//! A [`RemoteEntity`] is one kind of resource a simulated cloud service
//! stores: a bucket, a VPC, a subnet. The service actor owns the records;
//! the hooks below let each kind validate its own parameters and evolve its
//! own state.

use super::error::BackendError;
use async_trait::async_trait;
use controller_runtime::Tags;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use tokio::time::Instant;

#[async_trait]
pub trait RemoteEntity: Clone + Debug + Send + Sync + 'static {
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug;
    type Create: Send + Sync + Debug;
    type Update: Send + Sync + Debug;
    /// Dependencies injected when the service starts (scope, other services).
    type Context: Send + Sync;

    /// Picks the identifier for a new record.
    ///
    /// `seq` is unique within one service. Name-addressed kinds ignore it and
    /// use the caller-chosen name instead.
    fn assign_id(seq: u32, params: &Self::Create) -> Self::Id;

    fn from_create_params(
        id: Self::Id,
        params: Self::Create,
        ctx: &Self::Context,
    ) -> Result<Self, BackendError>;

    async fn on_create(&mut self, _ctx: &Self::Context) -> Result<(), BackendError> {
        Ok(())
    }

    async fn on_update(
        &mut self,
        update: Self::Update,
        ctx: &Self::Context,
    ) -> Result<(), BackendError>;

    async fn on_delete(&self, _ctx: &Self::Context) -> Result<(), BackendError> {
        Ok(())
    }

    /// Advances state the service changes on its own, such as provisioning.
    ///
    /// Called before the record is observed, never by the caller directly.
    fn refresh(&mut self, _now: Instant) {}

    fn tags_mut(&mut self) -> &mut Tags;
}
