//! Landskip Engine - the state reconciliation core
//!
//! This crate turns descriptor files and installed releases into comparable
//! component sets, diffs them, and executes the resulting plan:
//! - **State sources**: `FileState` (desired) and `ClusterState` (current)
//! - **Diff**: structural comparison with forced-update promotion
//! - **Applier**: stage-gated, ordered side effects through the
//!   collaborator seams
//! - **Reconciler**: one-shot or periodic convergence with cooperative
//!   cancellation

pub mod apply;
pub mod diff;
pub mod error;
pub mod reconcile;
pub mod state;

pub use apply::{Applier, ApplyOptions, Stage};
pub use diff::{
    component_diff_text, diff, forced_updates, is_only_secret_value_diff, promote_forced, Plan,
};
pub use error::{EngineError, Result};
pub use reconcile::{ReconcileConfig, Reconciler};
pub use state::{ClusterState, FileState, StateSource};
