//! # System Lifecycle & Orchestration
//!
//! Individual managers are simple; wiring services, factories, tenant
//! registries and reconcilers together is where the moving parts are. This
//! module owns that wiring.
//!
//! ## Startup Order
//!
//! 1. **Services** - one [`RemoteActor`](crate::backend::RemoteActor) per
//!    resource kind, created without dependencies.
//! 2. **Context injection** - each service starts with its context; the
//!    subnet service receives a client for the VPC service so it can refuse
//!    subnets in missing or pending VPCs.
//! 3. **Factories** - registered by kind in a
//!    [`FactoryRegistry`](controller_runtime::FactoryRegistry).
//! 4. **Controllers** - a [`ResourceController`] per type, holding the
//!    tenant's manager and its reconciler.
//!
//! ## Shutdown
//!
//! Service clients live in factories and managers. [`ControllerSystem::shutdown`]
//! drops all of them, each service's receive loop ends, and the task handles
//! are awaited. The dependency graph is acyclic (subnets depend on VPCs, not
//! the other way round), so channel closure is enough.
//!
//! ## Observability
//!
//! Call [`setup_tracing`](controller_runtime::tracing::setup_tracing) once.
//! Passes log inside a `reconcile{kind, key}` span, remote calls inside a
//! `manager{kind, account, region}` span, and services log every mutation.
//!
//! ```bash
//! RUST_LOG=info cargo run      # passes and mutations
//! RUST_LOG=debug cargo run     # deltas, payloads and skipped updates
//! ```

pub mod controller_system;
pub mod resource_controller;

pub use controller_system::*;
pub use resource_controller::*;
