//! Configuration values with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};

/// Reserved configuration key carrying reconciler ownership metadata.
pub const METADATA_KEY: &str = "_landscaper_metadata";
const META_RELEASE_VERSION: &str = "releaseversion";
const META_CHART_REPO: &str = "chartrepository";

/// Configuration values applied to a component's release.
///
/// A mapping of string keys to arbitrary YAML/JSON values. Deep merge
/// rules:
/// - Scalars and sequences: overlay replaces base
/// - Mappings: recursive merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(pub Map<String, JsonValue>);

/// Ownership metadata stored inside a release's configuration.
///
/// A release whose configuration carries this sub-map is managed by the
/// reconciler; one without it is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub release_version: String,
    pub chart_repository: String,
}

impl Configuration {
    /// Create empty configuration
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Encode the configuration as a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CoreError::from)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    /// Deep merge an overlay into this configuration (overlay wins)
    pub fn merge(&mut self, overlay: &Configuration) {
        for (key, overlay_value) in &overlay.0 {
            match self.0.get_mut(key) {
                Some(base_value) => deep_merge(base_value, overlay_value),
                None => {
                    self.0.insert(key.clone(), overlay_value.clone());
                }
            }
        }
    }

    /// Deep merge defaults beneath this configuration (existing values win)
    ///
    /// This is the coalescing primitive: chart defaults and global
    /// overrides fill in the gaps without clobbering what the user set.
    pub fn merge_defaults(&mut self, defaults: &Configuration) {
        let mut merged = defaults.clone();
        merged.merge(self);
        *self = merged;
    }

    /// Whether the configuration carries reconciler metadata
    pub fn has_metadata(&self) -> bool {
        self.0.contains_key(METADATA_KEY)
    }

    /// Read the reconciler metadata, if present and well-formed
    pub fn metadata(&self) -> Result<Metadata> {
        let value = self.0.get(METADATA_KEY).ok_or(CoreError::NoMetadata)?;
        let map = value.as_object().ok_or(CoreError::NoMetadata)?;

        let release_version = map
            .get(META_RELEASE_VERSION)
            .and_then(JsonValue::as_str)
            .ok_or(CoreError::NoMetadata)?
            .to_string();
        let chart_repository = map
            .get(META_CHART_REPO)
            .and_then(JsonValue::as_str)
            .ok_or(CoreError::NoMetadata)?
            .to_string();

        Ok(Metadata {
            release_version,
            chart_repository,
        })
    }

    /// Store the reconciler metadata, replacing any previous value
    pub fn set_metadata(&mut self, metadata: &Metadata) {
        let mut map = Map::new();
        map.insert(
            META_RELEASE_VERSION.to_string(),
            JsonValue::String(metadata.release_version.clone()),
        );
        map.insert(
            META_CHART_REPO.to_string(),
            JsonValue::String(metadata.chart_repository.clone()),
        );
        self.0.insert(METADATA_KEY.to_string(), JsonValue::Object(map));
    }
}

impl FromIterator<(String, JsonValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deep merge two JSON values (overlay wins for non-mappings)
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
