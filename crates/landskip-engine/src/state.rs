//! State sources: desired state from descriptor files, current state from
//! the cluster

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use landskip_core::{
    coalesce_values, validate_components, Component, Components, Configuration, ChartLoader,
    Metadata, ReleaseClient, SecretNames, SecretsReader,
};

use crate::error::{EngineError, Result};

/// Produces a component set: the desired one (from files) or the current
/// one (from the cluster). The reconciler holds one of each and treats
/// them identically.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn components(&self) -> Result<Components>;
}

/// Desired state read from descriptor files
pub struct FileState {
    paths: Vec<PathBuf>,
    secrets: Arc<dyn SecretsReader>,
    charts: Arc<dyn ChartLoader>,
    prefix: String,
    namespace: String,
    environment: String,
    override_file: Option<PathBuf>,
}

impl FileState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paths: Vec<PathBuf>,
        secrets: Arc<dyn SecretsReader>,
        charts: Arc<dyn ChartLoader>,
        prefix: impl Into<String>,
        namespace: impl Into<String>,
        environment: impl Into<String>,
        override_file: Option<PathBuf>,
    ) -> Self {
        Self {
            paths,
            secrets,
            charts,
            prefix: prefix.into(),
            namespace: namespace.into(),
            environment: environment.into(),
            override_file: override_file.map(Into::into),
        }
    }

    fn load_override(&self) -> Result<Option<Configuration>> {
        let Some(path) = &self.override_file else {
            return Ok(None);
        };
        let file = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Override {
            file: file.clone(),
            source: e.into(),
        })?;
        let config = Configuration::from_yaml(&content)
            .map_err(|e| EngineError::Override { file, source: e })?;
        Ok(Some(config))
    }

    /// Expand directory arguments to the `*.yaml` files directly inside
    fn expand(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                debug!(dir = %path.display(), "crawl directory for *.yaml");
                let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                    .map_err(|e| EngineError::Io {
                        path: path.display().to_string(),
                        source: e,
                    })?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "yaml"))
                    .collect();
                entries.sort();
                files.extend(entries);
            } else {
                files.push(path.clone());
            }
        }
        Ok(files)
    }

    /// Make a file component look identical to one rebuilt from the cluster
    async fn normalize(&self, cmp: &mut Component) -> landskip_core::Result<()> {
        cmp.configuration
            .insert("Name", serde_json::Value::String(cmp.name.clone()));
        cmp.name = format!("{}{}", self.prefix, cmp.name.to_lowercase());
        if !cmp.secret_names.is_empty() {
            cmp.configuration
                .insert("secretsRef", serde_json::Value::String(cmp.name.clone()));
        }

        let (repo, chart) = cmp.release.chart.split_once('/').ok_or_else(|| {
            landskip_core::CoreError::BadChartRef {
                chart_ref: cmp.release.chart.clone(),
            }
        })?;
        let (repo, chart) = (repo.to_string(), chart.to_string());
        cmp.release.chart = chart;
        cmp.configuration.set_metadata(&Metadata {
            release_version: cmp.release.version.clone(),
            chart_repository: repo,
        });

        if cmp.namespace.is_empty() {
            cmp.namespace = self.namespace.clone();
        }

        // an unversioned chart ref pins to whatever the loader delivers
        if !cmp.release.chart.contains(':') {
            let (chart, _) = self.charts.load(&cmp.full_chart_ref()?).await?;
            cmp.release.chart = format!("{}:{}", cmp.release.chart, chart.metadata.version);
        }

        Ok(())
    }

    async fn coalesce(&self, cmp: &mut Component) -> landskip_core::Result<()> {
        debug!(chart = %cmp.release.chart, "coalesce component");
        let (chart, _) = self.charts.load(&cmp.full_chart_ref()?).await?;
        cmp.configuration = coalesce_values(&chart, &cmp.configuration);
        Ok(())
    }

    /// Apply the global override, then the selected environment overlay.
    /// Overlays win over what they cover: environment > override > file.
    fn apply_overlays(&self, cmp: &mut Component, global: &Option<Configuration>) {
        if let Some(global) = global {
            cmp.configuration.merge(global);
        }
        if !self.environment.is_empty() {
            if let Some(overlay) = cmp.environments.get(&self.environment) {
                let overlay = overlay.clone();
                cmp.configuration.merge(&overlay);
            }
        }
        // state comparison must not see descriptor-only data
        cmp.environments = BTreeMap::new();
    }

    async fn load_file(
        &self,
        file: &Path,
        global: &Option<Configuration>,
    ) -> Result<Component> {
        let name = file.display().to_string();
        debug!(file = %name, "read desired state from file");

        let content = std::fs::read_to_string(file).map_err(|e| EngineError::Io {
            path: name.clone(),
            source: e,
        })?;
        let mut cmp = Component::from_yaml(&content).map_err(|e| EngineError::Descriptor {
            file: name.clone(),
            source: e,
        })?;

        self.normalize(&mut cmp)
            .await
            .map_err(|e| EngineError::Descriptor {
                file: name.clone(),
                source: e,
            })?;
        self.coalesce(&mut cmp).await?;
        self.apply_overlays(&mut cmp, global);

        if !cmp.secret_names.is_empty() {
            let values = self
                .secrets
                .read(&cmp.name, &cmp.namespace, Some(&cmp.secret_names))
                .await?;
            cmp.secret_values = values;
        }

        cmp.validate().map_err(|e| EngineError::Validation {
            file: name,
            source: e,
        })?;

        Ok(cmp)
    }
}

#[async_trait]
impl StateSource for FileState {
    async fn components(&self) -> Result<Components> {
        let files = self.expand()?;
        info!(files = files.len(), "obtain desired state from files");

        let global = self.load_override()?;
        let mut components = Components::new();

        for file in &files {
            let cmp = self.load_file(file, &global).await?;
            if components.contains_key(&cmp.name) {
                return Err(EngineError::DuplicateName { name: cmp.name });
            }
            components.insert(cmp.name.clone(), cmp);
        }

        validate_components(&components)?;

        debug!(n_components = components.len(), "desired state has been read");
        Ok(components)
    }
}

/// Current state rebuilt from installed releases
pub struct ClusterState {
    client: Arc<dyn ReleaseClient>,
    secrets: Arc<dyn SecretsReader>,
    prefix: String,
}

impl ClusterState {
    pub fn new(
        client: Arc<dyn ReleaseClient>,
        secrets: Arc<dyn SecretsReader>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            secrets,
            prefix: prefix.into(),
        }
    }

    fn component_from_release(
        &self,
        release: &landskip_core::InstalledRelease,
    ) -> Result<Component> {
        let config = coalesce_values(&release.chart, &release.config);
        if !config.has_metadata() {
            return Err(EngineError::NonManaged);
        }
        let metadata = config.metadata().map_err(EngineError::Core)?;

        Ok(Component::new(
            release.name.clone(),
            release.namespace.clone(),
            landskip_core::Release {
                chart: format!(
                    "{}:{}",
                    release.chart.metadata.name, release.chart.metadata.version
                ),
                version: metadata.release_version,
            },
            config,
            BTreeMap::new(),
            SecretNames::new(),
        ))
    }
}

#[async_trait]
impl StateSource for ClusterState {
    async fn components(&self) -> Result<Components> {
        info!("obtain current state releases from the cluster");

        let filter = format!("^{}.+", self.prefix);
        let summaries = self.client.list(&filter).await?;
        let total = summaries.len();

        let mut components = Components::new();
        for summary in summaries {
            let release = self.client.content(&summary.name).await?;

            // a release whose stored content disagrees with the listing on
            // namespace is not in our target namespace set
            if release.namespace != summary.namespace {
                debug!(release = %summary.name, "namespace mismatch, skipping");
                continue;
            }

            let mut cmp = match self.component_from_release(&release) {
                Ok(cmp) => cmp,
                Err(EngineError::NonManaged) => {
                    debug!(release = %summary.name, "not controlled by landskip, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            // unmanaged secrets stay invisible; only a secretsRef marks a
            // release as having reconciler-owned secrets
            if cmp.configuration.contains_key("secretsRef") {
                cmp.secret_values = self
                    .secrets
                    .read(&cmp.name, &cmp.namespace, None)
                    .await?;
            }

            components.insert(cmp.name.clone(), cmp);
        }

        info!(
            total_releases = total,
            managed_components = components.len(),
            "retrieved releases"
        );
        Ok(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use landskip_core::{Chart, Configuration, InstalledRelease, StaticCharts};
    use landskip_kube::{MockReleaseClient, MockSecrets};

    fn chart_loader() -> Arc<StaticCharts> {
        let mut charts = StaticCharts::new();
        charts.insert(Chart::new(
            "hello-world",
            "0.1.0",
            Configuration::from_yaml("message: xxx\n").unwrap(),
        ));
        charts.insert(Chart::new(
            "hello-secret",
            "1.3.37",
            Configuration::from_yaml("message: xxx\n").unwrap(),
        ));
        Arc::new(charts)
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    fn seeded_secrets() -> Arc<MockSecrets> {
        Arc::new(MockSecrets::with_seed([
            ("hello-name".to_string(), b"n4me".to_vec()),
            ("hello-age".to_string(), b"4ge".to_vec()),
            ("look-here-one".to_string(), b"one".to_vec()),
        ]))
    }

    fn file_state(paths: Vec<PathBuf>, environment: &str, override_file: Option<PathBuf>) -> FileState {
        FileState::new(
            paths,
            seeded_secrets(),
            chart_loader(),
            "pfx-",
            "spa",
            environment,
            override_file,
        )
    }

    const HELLO_WORLD: &str = r#"
name: Hello-World
release:
  chart: local/hello-world:0.1.0
  version: 0.1.0
configuration:
  message: Hello, Landskipped world!
"#;

    const SECRETIVE: &str = r#"
name: secretive
namespace: newnam
release:
  chart: local/hello-secret
  version: 1.0.0
secrets:
  - hello-name
  - hello-age
"#;

    #[tokio::test]
    async fn test_file_state_normalises_components() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "hello-world.yaml", HELLO_WORLD);
        write_file(dir.path(), "secretive.yaml", SECRETIVE);

        let fs = file_state(vec![dir.path().to_path_buf()], "", None);
        let components = fs.components().await.unwrap();

        assert_eq!(components.len(), 2);
        assert!(components.contains_key("pfx-hello-world"));
        assert!(components.contains_key("pfx-secretive"));

        let c0 = &components["pfx-hello-world"];
        assert_eq!(c0.release.chart, "hello-world:0.1.0");
        assert_eq!(c0.release.version, "0.1.0");
        assert_eq!(c0.full_chart_ref().unwrap(), "local/hello-world:0.1.0");
        assert_eq!(c0.namespace, "spa"); // defaulted
        assert_eq!(c0.configuration.get("Name").unwrap(), "Hello-World");
        assert_eq!(
            c0.configuration.get("message").unwrap(),
            "Hello, Landskipped world!"
        );
        assert!(!c0.release.chart.contains('/'));

        let m = c0.configuration.metadata().unwrap();
        assert_eq!(m.chart_repository, "local");
        assert_eq!(m.release_version, "0.1.0");

        let c1 = &components["pfx-secretive"];
        assert_eq!(c1.namespace, "newnam"); // overridden in the file
        // unversioned ref completed from the chart
        assert_eq!(c1.release.chart, "hello-secret:1.3.37");
        // chart default shines through
        assert_eq!(c1.configuration.get("message").unwrap(), "xxx");
        assert_eq!(c1.configuration.get("secretsRef").unwrap(), "pfx-secretive");
        assert_eq!(c1.secret_values["hello-name"], b"n4me".to_vec());
        assert_eq!(c1.secret_values["hello-age"], b"4ge".to_vec());
    }

    #[tokio::test]
    async fn test_file_state_explicit_files_equal_directory() {
        let dir = tempfile::tempdir().unwrap();
        let f0 = write_file(dir.path(), "hello-world.yaml", HELLO_WORLD);
        let f1 = write_file(dir.path(), "secretive.yaml", SECRETIVE);

        let from_dir = file_state(vec![dir.path().to_path_buf()], "", None)
            .components()
            .await
            .unwrap();
        let from_files = file_state(vec![f1, f0], "", None).components().await.unwrap();

        let dir_names: Vec<_> = from_dir.keys().collect();
        let file_names: Vec<_> = from_files.keys().collect();
        assert_eq!(dir_names, file_names);
    }

    #[tokio::test]
    async fn test_file_state_secret_map_form() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "mapped.yaml",
            r#"
name: mapped
release:
  chart: local/hello-secret:1.3.37
  version: 1.0.0
secrets:
  in-chart-key: look-here-one
"#,
        );

        let fs = file_state(vec![dir.path().to_path_buf()], "", None);
        let components = fs.components().await.unwrap();
        let cmp = &components["pfx-mapped"];

        assert_eq!(cmp.secret_values["in-chart-key"], b"one".to_vec());
    }

    #[tokio::test]
    async fn test_file_state_environment_and_override() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "hello.yaml",
            r#"
name: hello
release:
  chart: local/hello-world:0.1.0
  version: 1.0.0
configuration:
  message: Hello
environments:
  env2:
    message: env2!
"#,
        );
        let override_file = write_file(dir.path(), "global.yaml", "message: G\nextra: E\n");
        // the override file is not a descriptor; list files explicitly
        let descriptor = dir.path().join("hello.yaml");

        // no environment: override wins over the file configuration
        let fs = file_state(vec![descriptor.clone()], "", Some(override_file.clone()));
        let cmp = &fs.components().await.unwrap()["pfx-hello"];
        assert_eq!(cmp.configuration.get("message").unwrap(), "G");
        assert_eq!(cmp.configuration.get("extra").unwrap(), "E");
        assert!(cmp.environments.is_empty());

        // env2: environment overlay wins over the override
        let fs = file_state(vec![descriptor.clone()], "env2", Some(override_file));
        let cmp = &fs.components().await.unwrap()["pfx-hello"];
        assert_eq!(cmp.configuration.get("message").unwrap(), "env2!");
        assert_eq!(cmp.configuration.get("extra").unwrap(), "E");

        // unknown environment: overlay is absent, configuration untouched
        let fs = file_state(vec![descriptor], "env9", None);
        let cmp = &fs.components().await.unwrap()["pfx-hello"];
        assert_eq!(cmp.configuration.get("message").unwrap(), "Hello");
        assert!(cmp.environments.is_empty());
    }

    #[tokio::test]
    async fn test_file_state_rejects_bad_chart_ref() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "bad.yaml",
            "name: bad\nrelease:\n  chart: no-repo-part\n  version: 1.0.0\n",
        );

        let err = file_state(vec![dir.path().to_path_buf()], "", None)
            .components()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
        assert!(err.to_string().contains("no-repo-part"));
    }

    #[tokio::test]
    async fn test_file_state_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "nameless.yaml", "release:\n  chart: a/b\n  version: 1.0.0\n");

        let err = file_state(vec![dir.path().to_path_buf()], "", None)
            .components()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Descriptor { .. }));
        assert!(err.to_string().contains("name"));
    }

    #[tokio::test]
    async fn test_file_state_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "one.yaml", HELLO_WORLD);
        write_file(dir.path(), "two.yaml", HELLO_WORLD);

        let err = file_state(vec![dir.path().to_path_buf()], "", None)
            .components()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName { ref name } if name == "pfx-hello-world"));
    }

    #[tokio::test]
    async fn test_file_state_rejects_overlong_name() {
        let dir = tempfile::tempdir().unwrap();
        let name = "x".repeat(50); // 54 after "pfx-"
        write_file(
            dir.path(),
            "long.yaml",
            &format!("name: {}\nrelease:\n  chart: local/hello-world:0.1.0\n  version: 1.0.0\n", name),
        );

        let err = file_state(vec![dir.path().to_path_buf()], "", None)
            .components()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    fn managed_release(name: &str, namespace: &str) -> InstalledRelease {
        InstalledRelease {
            name: name.to_string(),
            namespace: namespace.to_string(),
            chart: Chart::new(
                "chart-name",
                "1.3.37",
                Configuration::from_yaml("config_a: xxx\nconfig_b: yyy\n").unwrap(),
            ),
            config: Configuration::from_yaml(
                r#"
_landscaper_metadata:
  releaseversion: 1.2.3
  chartrepository: repo1
config_b: zzz
config_c: qqq
"#,
            )
            .unwrap(),
        }
    }

    fn unmanaged_release(name: &str) -> InstalledRelease {
        InstalledRelease {
            name: name.to_string(),
            namespace: "my-namespace".to_string(),
            chart: Chart::new("chart-name", "1.3.37", Configuration::new()),
            config: Configuration::from_yaml("config_b: zzz\n").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_cluster_state_rebuilds_components() {
        let client = Arc::new(MockReleaseClient::with_releases(vec![managed_release(
            "pfx-release",
            "my-namespace",
        )]));
        let cs = ClusterState::new(client, Arc::new(MockSecrets::new()), "pfx-");

        let components = cs.components().await.unwrap();
        assert_eq!(components.len(), 1);

        let cmp = &components["pfx-release"];
        assert_eq!(cmp.name, "pfx-release");
        assert_eq!(cmp.namespace, "my-namespace");
        assert_eq!(cmp.release.chart, "chart-name:1.3.37");
        assert_eq!(cmp.release.version, "1.2.3");
        // chart default, override, and values-only keys all present
        assert_eq!(cmp.configuration.get("config_a").unwrap(), "xxx");
        assert_eq!(cmp.configuration.get("config_b").unwrap(), "zzz");
        assert_eq!(cmp.configuration.get("config_c").unwrap(), "qqq");
        // metadata is retained for equality with the desired side
        assert!(cmp.configuration.has_metadata());
        assert!(cmp.secret_names.is_empty());
        assert!(cmp.secret_values.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_state_skips_unmanaged() {
        let client = Arc::new(MockReleaseClient::with_releases(vec![
            managed_release("pfx-ours", "my-namespace"),
            unmanaged_release("pfx-theirs"),
        ]));
        let cs = ClusterState::new(client, Arc::new(MockSecrets::new()), "pfx-");

        let components = cs.components().await.unwrap();
        assert_eq!(components.len(), 1);
        assert!(components.contains_key("pfx-ours"));
    }

    #[tokio::test]
    async fn test_cluster_state_filters_by_prefix() {
        let client = Arc::new(MockReleaseClient::with_releases(vec![
            managed_release("pfx-ours", "my-namespace"),
            managed_release("other-release", "my-namespace"),
        ]));
        let cs = ClusterState::new(client, Arc::new(MockSecrets::new()), "pfx-");

        let components = cs.components().await.unwrap();
        assert_eq!(components.len(), 1);
        assert!(components.contains_key("pfx-ours"));
    }

    #[tokio::test]
    async fn test_cluster_state_reads_secrets_for_secrets_ref() {
        let mut with_ref = managed_release("pfx-with-secrets", "my-namespace");
        with_ref
            .config
            .insert("secretsRef", serde_json::Value::String("pfx-with-secrets".into()));

        let secrets = Arc::new(MockSecrets::new());
        let mut stored = landskip_core::SecretValues::new();
        stored.insert("k".to_string(), b"v".to_vec());
        secrets.put_stored("pfx-with-secrets", "my-namespace", stored.clone());

        let client = Arc::new(MockReleaseClient::with_releases(vec![
            with_ref,
            managed_release("pfx-no-secrets", "my-namespace"),
        ]));
        let cs = ClusterState::new(client, secrets, "pfx-");

        let components = cs.components().await.unwrap();
        assert_eq!(components["pfx-with-secrets"].secret_values, stored);
        assert!(components["pfx-no-secrets"].secret_values.is_empty());
    }

    /// A client whose listing disagrees with the stored content on
    /// namespace, as happens when a release moves while we reconcile
    struct MismatchedClient;

    #[async_trait]
    impl ReleaseClient for MismatchedClient {
        async fn list(
            &self,
            _filter: &str,
        ) -> landskip_core::Result<Vec<landskip_core::ReleaseSummary>> {
            Ok(vec![landskip_core::ReleaseSummary {
                name: "pfx-elsewhere".to_string(),
                namespace: "ns-a".to_string(),
            }])
        }

        async fn content(&self, name: &str) -> landskip_core::Result<InstalledRelease> {
            Ok(managed_release(name, "ns-b"))
        }

        async fn install(
            &self,
            _chart_path: &Path,
            _namespace: &str,
            _name: &str,
            _values_yaml: &str,
            _options: &landskip_core::InstallOptions,
        ) -> landskip_core::Result<()> {
            Ok(())
        }

        async fn upgrade(
            &self,
            _name: &str,
            _chart_path: &Path,
            _values_yaml: &str,
            _options: &landskip_core::UpgradeOptions,
        ) -> landskip_core::Result<()> {
            Ok(())
        }

        async fn delete(
            &self,
            _name: &str,
            _purge: bool,
            _dry_run: bool,
        ) -> landskip_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cluster_state_skips_namespace_mismatch() {
        let cs = ClusterState::new(
            Arc::new(MismatchedClient),
            Arc::new(MockSecrets::new()),
            "pfx-",
        );
        let components = cs.components().await.unwrap();
        assert!(components.is_empty());
    }
}
