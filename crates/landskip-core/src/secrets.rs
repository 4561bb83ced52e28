//! Secret names, values and the secret source/store seams

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

/// Secret bytes keyed by their in-chart name. Held in memory only; the
/// component model never serialises these.
pub type SecretValues = BTreeMap<String, Vec<u8>>;

/// Mapping of in-chart secret key to external lookup key.
///
/// Descriptors may use either YAML shape: a sequence of names (the lookup
/// key equals the in-chart key) or an explicit mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SecretNames(pub BTreeMap<String, String>);

impl SecretNames {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for SecretNames {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for SecretNames {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            List(Vec<String>),
            Map(BTreeMap<String, String>),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::List(names) => {
                SecretNames(names.into_iter().map(|n| (n.clone(), n)).collect())
            }
            Shape::Map(map) => SecretNames(map),
        })
    }
}

/// Source of secret values for a release.
///
/// The desired-state side reads from an external secret source using the
/// lookup keys in `names`; the current-state side reads the blob stored in
/// the cluster for the release (`names` is `None`).
#[async_trait]
pub trait SecretsReader: Send + Sync {
    async fn read(
        &self,
        release: &str,
        namespace: &str,
        names: Option<&SecretNames>,
    ) -> Result<SecretValues>;
}

/// Destination for secret values attached to a release.
///
/// `delete` is idempotent: deleting a secret that does not exist succeeds.
#[async_trait]
pub trait SecretsWriter: Send + Sync {
    async fn write(&self, release: &str, namespace: &str, values: &SecretValues) -> Result<()>;

    async fn delete(&self, release: &str, namespace: &str) -> Result<()>;
}

/// Environment variable name for a secret lookup key
pub fn env_key(lookup: &str) -> String {
    lookup.to_uppercase().replace('-', "_")
}

/// Secret source backed by process environment variables.
///
/// Each lookup key is uppercased with `-` mapped to `_` and resolved as an
/// environment variable. A missing variable is an error: the desired state
/// names that secret, so it must exist.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSecrets;

#[async_trait]
impl SecretsReader for EnvironmentSecrets {
    async fn read(
        &self,
        _release: &str,
        _namespace: &str,
        names: Option<&SecretNames>,
    ) -> Result<SecretValues> {
        let mut values = SecretValues::new();

        let Some(names) = names else {
            return Ok(values);
        };

        for (key, lookup) in names.iter() {
            let var = env_key(lookup);
            let value = std::env::var(&var).map_err(|_| CoreError::SecretRead {
                name: key.clone(),
                message: format!("environment variable `{}` is not set", var),
            })?;
            values.insert(key.clone(), value.into_bytes());
        }

        Ok(values)
    }
}
