//! Release operations through the helm binary
//!
//! `HelmCli` implements the `ReleaseClient` seam by shelling out to
//! `helm`. Values are handed over via a temporary file; JSON output is
//! parsed for list and content queries. Chart default values are
//! rehydrated through the configured `ChartLoader`, since helm stores only
//! the user-supplied overrides with a release.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use landskip_core::{
    Chart, ChartLoader, Configuration, CoreError, InstallOptions, InstalledRelease,
    ReleaseClient, ReleaseSummary, UpgradeOptions,
};

use crate::error::{KubeError, Result};

/// Drives releases through the `helm` command line client
pub struct HelmCli {
    helm_bin: String,
    kube_context: Option<String>,
    charts: Arc<dyn ChartLoader>,
}

impl HelmCli {
    pub fn new(charts: Arc<dyn ChartLoader>) -> Self {
        Self {
            helm_bin: "helm".to_string(),
            kube_context: None,
            charts,
        }
    }

    /// Use a specific kubeconfig context for every invocation
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    /// Override the helm binary path
    pub fn with_binary(mut self, helm_bin: impl Into<String>) -> Self {
        self.helm_bin = helm_bin.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.helm_bin);
        cmd.args(args);
        if let Some(context) = &self.kube_context {
            cmd.args(["--kube-context", context]);
        }
        cmd.kill_on_drop(true);

        debug!(command = %args.join(" "), "run helm");
        let output = cmd.output().await?;

        if !output.status.success() {
            return Err(KubeError::Helm {
                command: args.first().unwrap_or(&"").to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    namespace: String,
}

#[derive(Deserialize)]
struct ReleaseMetadata {
    namespace: String,
    chart: String,
    version: String,
}

#[async_trait]
impl ReleaseClient for HelmCli {
    async fn list(&self, filter: &str) -> landskip_core::Result<Vec<ReleaseSummary>> {
        let stdout = self
            .run(&[
                "list",
                "--all-namespaces",
                "--max",
                "0",
                "--filter",
                filter,
                "--output",
                "json",
            ])
            .await
            .map_err(|e| release_op("<list>", e))?;

        let entries: Vec<ListEntry> =
            serde_json::from_slice(&stdout).map_err(|e| release_op("<list>", e.into()))?;

        Ok(entries
            .into_iter()
            .map(|e| ReleaseSummary {
                name: e.name,
                namespace: e.namespace,
            })
            .collect())
    }

    async fn content(&self, name: &str) -> landskip_core::Result<InstalledRelease> {
        let stdout = self
            .run(&["get", "metadata", name, "--output", "json"])
            .await
            .map_err(|e| release_op(name, e))?;
        let metadata: ReleaseMetadata =
            serde_json::from_slice(&stdout).map_err(|e| release_op(name, e.into()))?;

        let stdout = self
            .run(&["get", "values", name, "--namespace", &metadata.namespace, "--output", "json"])
            .await
            .map_err(|e| release_op(name, e))?;
        let values: serde_json::Value =
            serde_json::from_slice(&stdout).map_err(|e| release_op(name, e.into()))?;
        let config = match values {
            serde_json::Value::Object(map) => Configuration(map),
            serde_json::Value::Null => Configuration::new(),
            other => {
                return Err(release_op(
                    name,
                    KubeError::Serialization(format!("unexpected values payload: {}", other)),
                ))
            }
        };

        // Helm stores only the override values; chart defaults come back
        // through the chart loader. A release without our metadata has no
        // repository recorded, so its defaults stay empty; the reconciler
        // skips such releases anyway.
        let chart = match config.metadata() {
            Ok(m) => {
                let chart_ref =
                    format!("{}/{}:{}", m.chart_repository, metadata.chart, metadata.version);
                let (chart, _) = self.charts.load(&chart_ref).await?;
                chart
            }
            Err(_) => Chart::new(&metadata.chart, &metadata.version, Configuration::new()),
        };

        Ok(InstalledRelease {
            name: name.to_string(),
            namespace: metadata.namespace,
            chart,
            config,
        })
    }

    async fn install(
        &self,
        chart_path: &Path,
        namespace: &str,
        name: &str,
        values_yaml: &str,
        options: &InstallOptions,
    ) -> landskip_core::Result<()> {
        let values_file = write_values(values_yaml).map_err(|e| release_op(name, e))?;
        let timeout = format!("{}s", options.timeout_secs);

        let mut args = vec![
            "install",
            name,
            path_str(chart_path, name)?,
            "--namespace",
            namespace,
            "--create-namespace",
            "--values",
            values_file.path().to_str().unwrap_or_default(),
        ];
        if options.reuse_name {
            args.push("--replace");
        }
        if options.dry_run {
            args.push("--dry-run");
        }
        if options.wait {
            args.extend(["--wait", "--timeout", &timeout]);
        }

        self.run(&args).await.map_err(|e| release_op(name, e))?;
        Ok(())
    }

    async fn upgrade(
        &self,
        name: &str,
        chart_path: &Path,
        values_yaml: &str,
        options: &UpgradeOptions,
    ) -> landskip_core::Result<()> {
        let values_file = write_values(values_yaml).map_err(|e| release_op(name, e))?;
        let timeout = format!("{}s", options.timeout_secs);

        let mut args = vec![
            "upgrade",
            name,
            path_str(chart_path, name)?,
            "--values",
            values_file.path().to_str().unwrap_or_default(),
        ];
        if options.dry_run {
            args.push("--dry-run");
        }
        if options.wait {
            args.extend(["--wait", "--timeout", &timeout]);
        }

        self.run(&args).await.map_err(|e| release_op(name, e))?;
        Ok(())
    }

    async fn delete(&self, name: &str, purge: bool, dry_run: bool) -> landskip_core::Result<()> {
        let mut args = vec!["uninstall", name];
        if !purge {
            args.push("--keep-history");
        }
        if dry_run {
            args.push("--dry-run");
        }

        self.run(&args).await.map_err(|e| release_op(name, e))?;
        Ok(())
    }
}

fn release_op(release: &str, e: KubeError) -> CoreError {
    CoreError::ReleaseOp {
        release: release.to_string(),
        message: e.to_string(),
    }
}

fn path_str<'a>(path: &'a Path, release: &str) -> landskip_core::Result<&'a str> {
    path.to_str().ok_or_else(|| CoreError::ReleaseOp {
        release: release.to_string(),
        message: format!("chart path is not valid UTF-8: {}", path.display()),
    })
}

fn write_values(values_yaml: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("landskip-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(values_yaml.as_bytes())?;
    file.flush()?;
    Ok(file)
}
