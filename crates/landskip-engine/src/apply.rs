//! Executes a plan against the cluster, deletes first, creates last

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use landskip_core::{
    ChartLoader, Component, Components, InstallOptions, ReleaseClient, SecretsWriter,
    UpgradeOptions,
};

use crate::diff::{diff, forced_updates, log_differences, promote_forced};
use crate::error::Result;

/// A gate that can be individually disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Create,
    Update,
    Delete,
    DeleteSecrets,
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(Stage::Create),
            "update" => Ok(Stage::Update),
            "delete" => Ok(Stage::Delete),
            "deleteSecrets" => Ok(Stage::DeleteSecrets),
            other => Err(format!(
                "unknown stage `{}`, expected create, update, delete or deleteSecrets",
                other
            )),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Create => "create",
            Stage::Update => "update",
            Stage::Delete => "delete",
            Stage::DeleteSecrets => "deleteSecrets",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub wait: bool,
    pub wait_timeout_secs: u64,
    pub disabled_stages: BTreeSet<Stage>,
}

/// Applies a desired component set over the current one
pub struct Applier {
    charts: Arc<dyn ChartLoader>,
    releases: Arc<dyn ReleaseClient>,
    secrets: Arc<dyn SecretsWriter>,
    options: ApplyOptions,
}

impl Applier {
    pub fn new(
        charts: Arc<dyn ChartLoader>,
        releases: Arc<dyn ReleaseClient>,
        secrets: Arc<dyn SecretsWriter>,
        options: ApplyOptions,
    ) -> Self {
        Self {
            charts,
            releases,
            secrets,
            options,
        }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    fn enabled(&self, stage: Stage) -> bool {
        !self.options.disabled_stages.contains(&stage)
    }

    /// Transform the current state into the desired state.
    ///
    /// Deletes run first so forced updates and namespace moves free their
    /// release name before anything is created; creates run last. A forced
    /// pair lives in the delete/create buckets but is gated as an update.
    pub async fn apply(&self, desired: &Components, current: &Components) -> Result<()> {
        let mut plan = diff(desired, current);
        let forced = forced_updates(&plan, current);

        // a dry-run delete is not real, so the create half would collide
        // with the still-existing release; keep forced pairs as updates
        if !self.options.dry_run {
            plan = promote_forced(plan, current, &forced);
        }

        info!(
            create = plan.create.len(),
            update = plan.update.len(),
            delete = plan.delete.len(),
            "apply desired state"
        );
        log_differences(current, &plan)?;

        for (name, cmp) in &plan.delete {
            let gate = if forced.contains(name) { Stage::Update } else { Stage::Delete };
            if !self.enabled(gate) {
                info!(component = %name, stage = %gate, "stage disabled, skipping delete");
                continue;
            }
            self.delete_component(cmp).await?;
        }

        for (name, cmp) in &plan.update {
            if !self.enabled(Stage::Update) {
                info!(component = %name, "stage disabled, skipping update");
                continue;
            }
            self.update_component(cmp).await?;
        }

        for (name, cmp) in &plan.create {
            let gate = if forced.contains(name) { Stage::Update } else { Stage::Create };
            if !self.enabled(gate) {
                info!(component = %name, stage = %gate, "stage disabled, skipping create");
                continue;
            }
            self.create_component(cmp).await?;
        }

        info!(
            created = plan.create.len(),
            updated = plan.update.len(),
            deleted = plan.delete.len(),
            "applied desired state"
        );
        Ok(())
    }

    /// Install the component's release, writing its secrets first
    pub async fn create_component(&self, cmp: &Component) -> Result<()> {
        let chart_ref = cmp.full_chart_ref()?;
        // ensure the chart is present locally before handing its path over
        let (_, chart_path) = self.charts.load(&chart_ref).await?;
        let values = cmp.configuration.to_yaml()?;

        debug!(
            release = %cmp.name,
            chart = %cmp.release.chart,
            chart_path = %chart_path.display(),
            dry_run = self.options.dry_run,
            "create component"
        );

        if !cmp.secret_values.is_empty() && !self.options.dry_run {
            self.secrets
                .write(&cmp.name, &cmp.namespace, &cmp.secret_values)
                .await?;
        }

        self.releases
            .install(
                &chart_path,
                &cmp.namespace,
                &cmp.name,
                &values,
                &InstallOptions {
                    dry_run: self.options.dry_run,
                    wait: self.options.wait,
                    timeout_secs: self.options.wait_timeout_secs,
                    reuse_name: true,
                },
            )
            .await?;

        Ok(())
    }

    /// Upgrade the component's release in place, replacing its secret set
    pub async fn update_component(&self, cmp: &Component) -> Result<()> {
        let chart_ref = cmp.full_chart_ref()?;
        let (_, chart_path) = self.charts.load(&chart_ref).await?;
        let values = cmp.configuration.to_yaml()?;

        debug!(
            release = %cmp.name,
            chart = %cmp.release.chart,
            dry_run = self.options.dry_run,
            "update component"
        );

        if !self.options.dry_run {
            // delete-then-write so the new secret set exactly replaces the
            // old one; the delete is silent on not-found
            if self.enabled(Stage::DeleteSecrets) {
                self.secrets.delete(&cmp.name, &cmp.namespace).await?;
            }
            if !cmp.secret_values.is_empty() {
                self.secrets
                    .write(&cmp.name, &cmp.namespace, &cmp.secret_values)
                    .await?;
            }
        }

        self.releases
            .upgrade(
                &cmp.name,
                &chart_path,
                &values,
                &UpgradeOptions {
                    dry_run: self.options.dry_run,
                    wait: self.options.wait,
                    timeout_secs: self.options.wait_timeout_secs,
                },
            )
            .await?;

        Ok(())
    }

    /// Remove the component's release and its secrets
    pub async fn delete_component(&self, cmp: &Component) -> Result<()> {
        debug!(release = %cmp.name, dry_run = self.options.dry_run, "delete component");

        if !cmp.secret_values.is_empty()
            && !self.options.dry_run
            && self.enabled(Stage::DeleteSecrets)
        {
            self.secrets.delete(&cmp.name, &cmp.namespace).await?;
        }

        self.releases
            .delete(&cmp.name, true, self.options.dry_run)
            .await?;

        Ok(())
    }
}
