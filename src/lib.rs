#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Cloud Controller Recipe
//!
//! > **A Recipe for Reconciling Cloud Resources in Rust.**
//!
//! This crate demonstrates a pattern for building a controller that keeps
//! cloud resources in line with declarative custom resources (CRs). A
//! generic reconciliation core decides what to do; one small manager per
//! resource type knows how to do it.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why a generic core?
//!
//! Every resource type goes through the same loop: resolve references, read
//! the remote resource, create it or diff it, update it, fill in server-side
//! defaults, tag it, wait until it has converged. Writing that loop once
//! means a new resource type is only:
//! - a spec type that says which fields are comparable, and
//! - a manager that performs CRUD+L against the remote API.
//!
//! ### No global state
//!
//! Managers are built per (account, region, kind) by a factory and cached in
//! a [`TenantRegistry`](runtime::TenantRegistry). Each one owns its own copy
//! of the controller configuration.
//!
//! ## 🚀 Core Concepts
//!
//! ### The Delta
//! The reconciler computes the difference between desired and observed state
//! in exactly one place, from a per-type [`ComparisonPolicy`](runtime::ComparisonPolicy),
//! and hands it unchanged to `update`. An empty delta means no mutating call.
//!
//! ### Error Taxonomy
//! Managers classify every failure as a [`ResourceError`](runtime::ResourceError):
//! not found, transient, unresolved, terminal, invariant violation or
//! cancelled. The reconciler alone turns that into conditions and requeues.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Core ([`runtime`])
//! Identity, delta engine, manager contract, factories, tenant registry,
//! reconciler, and a mock manager for tests.
//!
//! ### 2. The Sample ([`sample`])
//! Buckets, VPCs and subnets against in-memory services that behave like the
//! real thing where it matters: server-side defaults, asynchronous
//! provisioning, throttling, non-destructive tagging.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the walkthrough with info logs
//! RUST_LOG=info cargo run -p controller-sample
//!
//! # Run every test in the workspace
//! cargo test --workspace
//! ```

pub use controller_runtime as runtime;
pub use controller_sample as sample;
