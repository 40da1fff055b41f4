//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for a controller process.
//! Levels come from `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info cargo run     # one line per state change
//! RUST_LOG=debug cargo run    # plus payloads at entry points
//! ```
//!
//! ## What Gets Traced
//!
//! - **Managers**: every manager carries a `manager` span with `kind`,
//!   `account` and `region`, opened when its factory builds it.
//! - **Passes**: the reconciler opens a `reconcile` span per pass with the
//!   resource `kind` and `key`, and logs the action it took.
//! - **Remote calls**: run inside the manager span; the sample services log
//!   each request they handle (`Created`, `Updated`, `Not found`, ...).
//!
//! With `RUST_LOG=info` a create pass reads like:
//!
//! ```text
//! INFO reconcile: Created kind=Bucket.s3.services.k8s.aws key=infra/bucket-a
//! INFO reconcile: Synced requeue=None
//! ```

/// Installs a compact `tracing-subscriber` formatter filtered by `RUST_LOG`.
///
/// Call once at startup; a second call panics inside `tracing-subscriber`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // kind/key fields say more than module paths
        .compact()
        .init();
}
