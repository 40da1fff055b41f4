//! # Controller Sample
//!
//! Three resource types built on `controller-runtime`, reconciled against
//! simulated cloud services. The library is exposed for the integration
//! tests; the binary runs a demo.
//!
//! - [`backend`] - in-memory services with server defaults, provisioning
//!   delays and throttling
//! - [`model`] - custom resource specs and the records services keep
//! - [`managers`] - one manager and factory per type
//! - [`lifecycle`] - starting, wiring and stopping everything

pub mod backend;
pub mod lifecycle;
pub mod managers;
pub mod model;
