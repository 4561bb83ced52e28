//! Apply command - make the current landscape match the desired one

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use landskip_charts::LocalCharts;
use landskip_core::{EnvironmentSecrets, ReleaseClient, SecretsReader, SecretsWriter};
use landskip_engine::{
    Applier, ApplyOptions, ClusterState, FileState, ReconcileConfig, Reconciler, Stage,
};
use landskip_kube::{ClusterSecrets, HelmCli};

use crate::error::{CliError, Result};

const ENV_PREFIX: &str = "LANDSCAPE_PREFIX";
const ENV_NAMESPACE: &str = "LANDSCAPE_NAMESPACE";
const ENV_DIR: &str = "LANDSCAPE_DIR";

/// Everything `apply` needs, resolved from flags and environment
pub struct ApplyArgs {
    pub files: Vec<PathBuf>,
    pub dry_run: bool,
    pub wait: bool,
    pub wait_timeout: u64,
    pub no_prefix: bool,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub loop_mode: bool,
    pub loop_interval: u64,
    pub disable: Vec<String>,
    pub environment: Option<String>,
    pub config_override: Option<PathBuf>,
    pub chart_home: Option<PathBuf>,
}

pub async fn run(args: ApplyArgs) -> Result<()> {
    let mut files = args.files;
    if let Ok(dir) = std::env::var(ENV_DIR) {
        warn!(
            "{} is deprecated; pass the directory as an argument instead",
            ENV_DIR
        );
        files.push(PathBuf::from(dir));
    }
    if files.is_empty() {
        return Err(CliError::Usage {
            message: "no descriptor files given".to_string(),
            help: Some("pass files or directories, e.g. `landskip apply landscape/`".to_string()),
        });
    }

    let prefix = if args.no_prefix {
        String::new()
    } else {
        args.prefix
            .or_else(|| std::env::var(ENV_PREFIX).ok())
            .unwrap_or_default()
    };
    let namespace = args
        .namespace
        .or_else(|| std::env::var(ENV_NAMESPACE).ok())
        .unwrap_or_else(|| "default".to_string());
    let environment = args.environment.unwrap_or_default();

    let mut disabled_stages = BTreeSet::new();
    for stage in &args.disable {
        let stage: Stage = stage.parse().map_err(CliError::usage)?;
        disabled_stages.insert(stage);
    }

    let chart_home = match args.chart_home {
        Some(home) => home,
        None => default_chart_home()?,
    };
    let charts = Arc::new(LocalCharts::new(chart_home));

    let kube_client = kube_client(args.context.as_deref()).await?;
    let cluster_secrets = ClusterSecrets::with_client(kube_client);

    let mut helm = HelmCli::new(charts.clone());
    if let Some(context) = &args.context {
        helm = helm.with_context(context.clone());
    }
    let releases: Arc<dyn ReleaseClient> = Arc::new(helm);

    let desired = FileState::new(
        files,
        Arc::new(EnvironmentSecrets),
        charts.clone(),
        prefix.clone(),
        namespace,
        environment,
        args.config_override,
    );
    let current = ClusterState::new(
        releases.clone(),
        Arc::new(cluster_secrets.clone()) as Arc<dyn SecretsReader>,
        prefix,
    );

    let applier = Applier::new(
        charts,
        releases,
        Arc::new(cluster_secrets) as Arc<dyn SecretsWriter>,
        ApplyOptions {
            dry_run: args.dry_run,
            wait: args.wait,
            wait_timeout_secs: args.wait_timeout,
            disabled_stages,
        },
    );

    let reconciler = Reconciler::new(
        Box::new(desired),
        Box::new(current),
        applier,
        ReconcileConfig {
            dry_run: args.dry_run,
            interval: args
                .loop_mode
                .then(|| Duration::from_secs(args.loop_interval)),
        },
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the in-flight tick");
            signal_cancel.cancel();
        }
    });

    reconciler.run(cancel).await?;

    if args.dry_run {
        println!(
            "{} Dry run - no actual actions performed",
            style("!").yellow().bold()
        );
    } else {
        println!("{} Landscape converged", style("✓").green().bold());
    }

    Ok(())
}

fn default_chart_home() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| CliError::Usage {
        message: "cannot determine the chart home".to_string(),
        help: Some("set --chart-home or the HOME environment variable".to_string()),
    })?;
    Ok(PathBuf::from(home).join(".landskip").join("charts"))
}

async fn kube_client(context: Option<&str>) -> Result<kube::Client> {
    let connect = |message: String| CliError::Connect { message };

    let config = match context {
        Some(context) => kube::Config::from_kubeconfig(&kube::config::KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| connect(format!("cannot load kubeconfig context '{}': {}", context, e)))?,
        None => kube::Config::infer()
            .await
            .map_err(|e| connect(format!("cannot infer cluster configuration: {}", e)))?,
    };

    kube::Client::try_from(config).map_err(|e| connect(format!("cannot build client: {}", e)))
}
