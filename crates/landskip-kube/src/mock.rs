//! In-memory mocks for engine and CLI tests
//!
//! These mirror the production clients without a cluster: releases and
//! secrets live in shared maps, and every call is recorded so tests can
//! assert exact side-effect sequences.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;

use landskip_core::{
    CoreError, InstallOptions, InstalledRelease, ReleaseClient, ReleaseSummary, SecretNames,
    SecretValues, SecretsReader, SecretsWriter, UpgradeOptions,
};

/// One recorded release-client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseCall {
    List {
        filter: String,
    },
    Content {
        name: String,
    },
    Install {
        name: String,
        namespace: String,
        dry_run: bool,
    },
    Upgrade {
        name: String,
        dry_run: bool,
    },
    Delete {
        name: String,
        purge: bool,
        dry_run: bool,
    },
}

/// Counts of operations performed, for quick assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseCallCounts {
    pub lists: usize,
    pub contents: usize,
    pub installs: usize,
    pub upgrades: usize,
    pub deletes: usize,
}

/// In-memory release client
#[derive(Clone, Default)]
pub struct MockReleaseClient {
    releases: Arc<RwLock<BTreeMap<String, InstalledRelease>>>,
    calls: Arc<RwLock<Vec<ReleaseCall>>>,
    fail_next: Arc<RwLock<Option<String>>>,
}

impl MockReleaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<InstalledRelease>) -> Self {
        let client = Self::new();
        {
            let mut store = client.releases.write().unwrap();
            for release in releases {
                store.insert(release.name.clone(), release);
            }
        }
        client
    }

    /// Make the next mutating call fail with the given message
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.write().unwrap() = Some(message.into());
    }

    pub fn calls(&self) -> Vec<ReleaseCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_counts(&self) -> ReleaseCallCounts {
        let mut counts = ReleaseCallCounts::default();
        for call in self.calls.read().unwrap().iter() {
            match call {
                ReleaseCall::List { .. } => counts.lists += 1,
                ReleaseCall::Content { .. } => counts.contents += 1,
                ReleaseCall::Install { .. } => counts.installs += 1,
                ReleaseCall::Upgrade { .. } => counts.upgrades += 1,
                ReleaseCall::Delete { .. } => counts.deletes += 1,
            }
        }
        counts
    }

    pub fn release_names(&self) -> Vec<String> {
        self.releases.read().unwrap().keys().cloned().collect()
    }

    fn record(&self, call: ReleaseCall) {
        self.calls.write().unwrap().push(call);
    }

    fn take_failure(&self, release: &str) -> landskip_core::Result<()> {
        match self.fail_next.write().unwrap().take() {
            Some(message) => Err(CoreError::ReleaseOp {
                release: release.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReleaseClient for MockReleaseClient {
    async fn list(&self, filter: &str) -> landskip_core::Result<Vec<ReleaseSummary>> {
        self.record(ReleaseCall::List {
            filter: filter.to_string(),
        });

        let re = Regex::new(filter).map_err(|e| CoreError::ReleaseOp {
            release: "<list>".to_string(),
            message: e.to_string(),
        })?;

        Ok(self
            .releases
            .read()
            .unwrap()
            .values()
            .filter(|r| re.is_match(&r.name))
            .map(|r| ReleaseSummary {
                name: r.name.clone(),
                namespace: r.namespace.clone(),
            })
            .collect())
    }

    async fn content(&self, name: &str) -> landskip_core::Result<InstalledRelease> {
        self.record(ReleaseCall::Content {
            name: name.to_string(),
        });

        self.releases
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ReleaseOp {
                release: name.to_string(),
                message: "release not found".to_string(),
            })
    }

    async fn install(
        &self,
        _chart_path: &Path,
        namespace: &str,
        name: &str,
        values_yaml: &str,
        options: &InstallOptions,
    ) -> landskip_core::Result<()> {
        self.record(ReleaseCall::Install {
            name: name.to_string(),
            namespace: namespace.to_string(),
            dry_run: options.dry_run,
        });
        self.take_failure(name)?;

        if !options.dry_run {
            let config = landskip_core::Configuration::from_yaml(values_yaml)?;
            self.releases.write().unwrap().insert(
                name.to_string(),
                InstalledRelease {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    chart: landskip_core::Chart::new(
                        "unknown",
                        "0.0.0",
                        landskip_core::Configuration::new(),
                    ),
                    config,
                },
            );
        }
        Ok(())
    }

    async fn upgrade(
        &self,
        name: &str,
        _chart_path: &Path,
        values_yaml: &str,
        options: &UpgradeOptions,
    ) -> landskip_core::Result<()> {
        self.record(ReleaseCall::Upgrade {
            name: name.to_string(),
            dry_run: options.dry_run,
        });
        self.take_failure(name)?;

        if !options.dry_run {
            let config = landskip_core::Configuration::from_yaml(values_yaml)?;
            if let Some(release) = self.releases.write().unwrap().get_mut(name) {
                release.config = config;
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str, purge: bool, dry_run: bool) -> landskip_core::Result<()> {
        self.record(ReleaseCall::Delete {
            name: name.to_string(),
            purge,
            dry_run,
        });
        self.take_failure(name)?;

        if !dry_run {
            self.releases.write().unwrap().remove(name);
        }
        Ok(())
    }
}

/// One recorded secrets call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretsCall {
    Read { release: String, namespace: String },
    Write { release: String, namespace: String },
    Delete { release: String, namespace: String },
}

/// In-memory secret source and store.
///
/// Named reads (desired state) resolve lookup keys against `seed`; blob
/// reads (current state) return whatever was written for the release.
#[derive(Clone, Default)]
pub struct MockSecrets {
    seed: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    store: Arc<RwLock<BTreeMap<(String, String), SecretValues>>>,
    calls: Arc<RwLock<Vec<SecretsCall>>>,
}

impl MockSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the external source with lookup-key → value pairs
    pub fn with_seed(seed: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        let secrets = Self::new();
        secrets.seed.write().unwrap().extend(seed);
        secrets
    }

    /// Pre-populate the cluster-side store for a release
    pub fn put_stored(&self, release: &str, namespace: &str, values: SecretValues) {
        self.store
            .write()
            .unwrap()
            .insert((namespace.to_string(), release.to_string()), values);
    }

    pub fn stored(&self, release: &str, namespace: &str) -> Option<SecretValues> {
        self.store
            .read()
            .unwrap()
            .get(&(namespace.to_string(), release.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<SecretsCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, SecretsCall::Write { .. }))
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, SecretsCall::Delete { .. }))
            .count()
    }

    fn record(&self, call: SecretsCall) {
        self.calls.write().unwrap().push(call);
    }
}

#[async_trait]
impl SecretsReader for MockSecrets {
    async fn read(
        &self,
        release: &str,
        namespace: &str,
        names: Option<&SecretNames>,
    ) -> landskip_core::Result<SecretValues> {
        self.record(SecretsCall::Read {
            release: release.to_string(),
            namespace: namespace.to_string(),
        });

        match names {
            Some(names) => {
                let seed = self.seed.read().unwrap();
                let mut values = SecretValues::new();
                for (key, lookup) in names.iter() {
                    let bytes = seed.get(lookup).ok_or_else(|| CoreError::SecretRead {
                        name: key.clone(),
                        message: format!("secret `{}` not found", lookup),
                    })?;
                    values.insert(key.clone(), bytes.clone());
                }
                Ok(values)
            }
            None => Ok(self
                .store
                .read()
                .unwrap()
                .get(&(namespace.to_string(), release.to_string()))
                .cloned()
                .unwrap_or_default()),
        }
    }
}

#[async_trait]
impl SecretsWriter for MockSecrets {
    async fn write(
        &self,
        release: &str,
        namespace: &str,
        values: &SecretValues,
    ) -> landskip_core::Result<()> {
        self.record(SecretsCall::Write {
            release: release.to_string(),
            namespace: namespace.to_string(),
        });
        self.store
            .write()
            .unwrap()
            .insert((namespace.to_string(), release.to_string()), values.clone());
        Ok(())
    }

    async fn delete(&self, release: &str, namespace: &str) -> landskip_core::Result<()> {
        self.record(SecretsCall::Delete {
            release: release.to_string(),
            namespace: namespace.to_string(),
        });
        // silent on not-found
        self.store
            .write()
            .unwrap()
            .remove(&(namespace.to_string(), release.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landskip_core::Configuration;

    fn release(name: &str, namespace: &str) -> InstalledRelease {
        InstalledRelease {
            name: name.to_string(),
            namespace: namespace.to_string(),
            chart: landskip_core::Chart::new("chart-name", "1.3.37", Configuration::new()),
            config: Configuration::new(),
        }
    }

    #[tokio::test]
    async fn test_list_applies_filter() {
        let client = MockReleaseClient::with_releases(vec![
            release("pfx-one", "ns"),
            release("pfx-two", "ns"),
            release("other", "ns"),
        ]);

        let names: Vec<String> = client
            .list("^pfx-.+")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, vec!["pfx-one", "pfx-two"]);
        assert_eq!(client.call_counts().lists, 1);
    }

    #[tokio::test]
    async fn test_install_and_delete_mutate_store() {
        let client = MockReleaseClient::new();
        client
            .install(
                Path::new("/charts/hello"),
                "ns",
                "pfx-hello",
                "message: hi\n",
                &InstallOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(client.release_names(), vec!["pfx-hello"]);

        client.delete("pfx-hello", true, false).await.unwrap();
        assert!(client.release_names().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_install_leaves_store_alone() {
        let client = MockReleaseClient::new();
        let options = InstallOptions {
            dry_run: true,
            ..Default::default()
        };
        client
            .install(Path::new("/charts/hello"), "ns", "pfx-hello", "", &options)
            .await
            .unwrap();
        assert!(client.release_names().is_empty());
    }

    #[tokio::test]
    async fn test_fail_next() {
        let client = MockReleaseClient::new();
        client.fail_next("boom");
        let err = client.delete("pfx-x", true, false).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        // failure is one-shot
        client.delete("pfx-x", true, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_secrets_named_read() {
        let secrets =
            MockSecrets::with_seed([("look-here-one".to_string(), b"s3cret".to_vec())]);
        let names: SecretNames = [("key-one".to_string(), "look-here-one".to_string())]
            .into_iter()
            .collect();

        let values = secrets.read("pfx-cmp", "ns", Some(&names)).await.unwrap();
        assert_eq!(values["key-one"], b"s3cret".to_vec());
    }

    #[tokio::test]
    async fn test_mock_secrets_blob_roundtrip() {
        let secrets = MockSecrets::new();
        let mut values = SecretValues::new();
        values.insert("k".to_string(), b"v".to_vec());

        secrets.write("pfx-cmp", "ns", &values).await.unwrap();
        let read = secrets.read("pfx-cmp", "ns", None).await.unwrap();
        assert_eq!(read, values);

        secrets.delete("pfx-cmp", "ns").await.unwrap();
        assert!(secrets.read("pfx-cmp", "ns", None).await.unwrap().is_empty());
        // idempotent
        secrets.delete("pfx-cmp", "ns").await.unwrap();
    }
}
