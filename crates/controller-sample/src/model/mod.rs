//! # Resource Types
//!
//! Each file defines one resource type twice: the custom resource a user
//! writes (`*Spec`, `*Status`) and the record the simulated service keeps
//! (`*Record`, with its `*Create`/`*Update` request payloads).

pub mod bucket;
pub mod subnet;
pub mod vpc;

pub use bucket::*;
pub use subnet::*;
pub use vpc::*;
