//! Landskip Kube - cluster-facing clients for landskip
//!
//! This crate provides the production implementations of the collaborator
//! seams defined in `landskip-core`:
//! - **`HelmCli`**: release operations through the `helm` binary
//! - **`ClusterSecrets`**: secret storage in Kubernetes Secrets
//! - **Mocks**: in-memory release client and secret store with call
//!   recording, for engine and CLI tests

pub mod error;
pub mod helm;
pub mod mock;
pub mod secrets;

pub use error::{KubeError, Result};
pub use helm::HelmCli;
pub use mock::{MockReleaseClient, MockSecrets, ReleaseCall, ReleaseCallCounts, SecretsCall};
pub use secrets::ClusterSecrets;
