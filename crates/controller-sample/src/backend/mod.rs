//! # Simulated Cloud Backend
//!
//! An in-memory stand-in for the remote services the sample managers talk
//! to. Each resource kind runs as its own service actor; managers hold a
//! [`RemoteClient`] the way a real manager holds an SDK client.
//!
//! ## Structure
//!
//! - [`entity`] - [`RemoteEntity`], the hooks a resource kind implements
//! - [`actor`] - [`RemoteActor`], the sequential service loop
//! - [`client`] - [`RemoteClient`], the cloneable request handle
//! - [`message`] - [`RemoteRequest`], the API calls on the wire
//! - [`error`] - [`BackendError`] and its mapping onto the runtime taxonomy
//!
//! ## Behaviours worth testing against
//!
//! - Server-side defaults: fields the caller omits come back filled in.
//! - Asynchronous provisioning: VPCs stay `pending` for
//!   [`ServiceScope::provisioning_delay`] after creation.
//! - Throttling: [`RemoteClient::inject_throttle`] fails the next N calls.
//! - Non-destructive tagging: `Tag` merges, it never removes.

pub mod actor;
pub mod client;
pub mod entity;
pub mod error;
pub mod message;

pub use actor::RemoteActor;
pub use client::RemoteClient;
pub use entity::RemoteEntity;
pub use error::BackendError;
pub use message::RemoteRequest;

use controller_runtime::{AccountId, Region, ResourceName};
use std::time::Duration;

/// Where a simulated service runs.
#[derive(Debug, Clone)]
pub struct ServiceScope {
    pub account_id: AccountId,
    pub region: Region,
    /// How long newly created resources stay in a transitional state.
    pub provisioning_delay: Duration,
}

impl ServiceScope {
    pub fn new(account_id: AccountId, region: Region) -> Self {
        Self {
            account_id,
            region,
            provisioning_delay: Duration::ZERO,
        }
    }

    pub fn with_provisioning_delay(mut self, delay: Duration) -> Self {
        self.provisioning_delay = delay;
        self
    }

    /// Builds a regional, account-scoped ARN for `service`.
    pub fn arn(&self, service: &str, resource: &str) -> ResourceName {
        ResourceName::build(
            "aws",
            service,
            &self.region.to_string(),
            &self.account_id.to_string(),
            resource,
        )
    }
}

/// Creates a service actor and its client with the default buffer size.
pub fn new<T: RemoteEntity>() -> (RemoteActor<T>, RemoteClient<T>) {
    RemoteActor::new(32)
}
