//! Kubernetes-backed secret storage
//!
//! One Secret per release, named after the release, in the release's
//! namespace. Reading for the current state tolerates a missing Secret;
//! deleting one that is already gone succeeds.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::debug;

use landskip_core::{CoreError, SecretNames, SecretValues, SecretsReader, SecretsWriter};

use crate::error::{KubeError, Result};

/// Secret store backed by Kubernetes Secrets
#[derive(Clone)]
pub struct ClusterSecrets {
    client: Client,
}

impl ClusterSecrets {
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get(&self, release: &str, namespace: &str) -> Result<Option<SecretValues>> {
        match self.api(namespace).get(release).await {
            Ok(secret) => {
                let mut values = SecretValues::new();
                for (key, bytes) in secret.data.unwrap_or_default() {
                    values.insert(key, bytes.0);
                }
                Ok(Some(values))
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn build_secret(release: &str, namespace: &str, values: &SecretValues) -> Secret {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "landskip".to_string(),
    );

    let mut data = BTreeMap::new();
    for (key, bytes) in values {
        data.insert(key.clone(), k8s_openapi::ByteString(bytes.clone()));
    }

    Secret {
        metadata: ObjectMeta {
            name: Some(release.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[async_trait]
impl SecretsReader for ClusterSecrets {
    async fn read(
        &self,
        release: &str,
        namespace: &str,
        names: Option<&SecretNames>,
    ) -> landskip_core::Result<SecretValues> {
        debug!(release, namespace, "read release secret");

        let stored = self
            .get(release, namespace)
            .await
            .map_err(|e| store_error(release, e))?
            .unwrap_or_default();

        let Some(names) = names else {
            return Ok(stored);
        };

        let mut values = SecretValues::new();
        for (key, lookup) in names.iter() {
            let bytes = stored.get(lookup).ok_or_else(|| CoreError::SecretRead {
                name: key.clone(),
                message: format!(
                    "key `{}` not present in secret `{}/{}`",
                    lookup, namespace, release
                ),
            })?;
            values.insert(key.clone(), bytes.clone());
        }
        Ok(values)
    }
}

#[async_trait]
impl SecretsWriter for ClusterSecrets {
    async fn write(
        &self,
        release: &str,
        namespace: &str,
        values: &SecretValues,
    ) -> landskip_core::Result<()> {
        debug!(release, namespace, keys = values.len(), "write release secret");

        let api = self.api(namespace);
        let secret = build_secret(release, namespace, values);

        match api.create(&PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                api.replace(release, &PostParams::default(), &secret)
                    .await
                    .map_err(|e| store_error(release, e.into()))?;
                Ok(())
            }
            Err(e) => Err(store_error(release, e.into())),
        }
    }

    async fn delete(&self, release: &str, namespace: &str) -> landskip_core::Result<()> {
        debug!(release, namespace, "delete release secret");

        match self.api(namespace).delete(release, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(store_error(release, e.into())),
        }
    }
}

fn store_error(release: &str, e: KubeError) -> CoreError {
    CoreError::SecretStore {
        name: release.to_string(),
        message: e.to_string(),
    }
}
