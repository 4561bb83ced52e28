//! The release installer seam
//!
//! The reconciler drives the package manager exclusively through this
//! trait; `landskip-kube` provides the production implementation.

use std::path::Path;

use async_trait::async_trait;

use crate::chart::Chart;
use crate::error::Result;
use crate::values::Configuration;

/// A release as listed by the package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
}

/// A release's full content: the chart it was installed from and the
/// values stored with it
#[derive(Debug, Clone)]
pub struct InstalledRelease {
    pub name: String,
    pub namespace: String,
    pub chart: Chart,
    pub config: Configuration,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub dry_run: bool,
    pub wait: bool,
    pub timeout_secs: u64,
    pub reuse_name: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    pub dry_run: bool,
    pub wait: bool,
    pub timeout_secs: u64,
}

/// Installs, upgrades, lists and deletes releases
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// List releases whose name matches the given regular expression
    async fn list(&self, filter: &str) -> Result<Vec<ReleaseSummary>>;

    /// Fetch the stored content of a release
    async fn content(&self, name: &str) -> Result<InstalledRelease>;

    async fn install(
        &self,
        chart_path: &Path,
        namespace: &str,
        name: &str,
        values_yaml: &str,
        options: &InstallOptions,
    ) -> Result<()>;

    async fn upgrade(
        &self,
        name: &str,
        chart_path: &Path,
        values_yaml: &str,
        options: &UpgradeOptions,
    ) -> Result<()>;

    async fn delete(&self, name: &str, purge: bool, dry_run: bool) -> Result<()>;
}
