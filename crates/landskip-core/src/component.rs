//! The component model: one record per managed release

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::secrets::{SecretNames, SecretValues};
use crate::values::{Configuration, Metadata};

/// Maximum release name length, prefix included
pub const NAME_MAX: usize = 51;

/// The chart and release version a component should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Chart reference: `repo/name[:chart-version]` in descriptors,
    /// `name:chart-version` after normalisation
    pub chart: String,

    /// The user's own release version, independent of the chart version
    pub version: String,
}

/// A uniquely named collection of components
pub type Components = BTreeMap<String, Component>;

/// The reconciler-level record for one release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    pub release: Release,

    #[serde(default)]
    pub configuration: Configuration,

    /// Per-environment configuration overlays. Emptied once the selected
    /// overlay has been applied so state comparison never sees them.
    #[serde(default)]
    pub environments: BTreeMap<String, Configuration>,

    #[serde(default, rename = "secrets")]
    pub secret_names: SecretNames,

    /// In memory only; never persisted in descriptors or configuration
    #[serde(skip)]
    pub secret_values: SecretValues,
}

#[derive(Deserialize)]
struct RawRelease {
    #[serde(default)]
    chart: String,
    #[serde(default)]
    version: String,
}

#[derive(Deserialize)]
struct RawComponent {
    name: Option<String>,
    #[serde(default)]
    namespace: String,
    release: Option<RawRelease>,
    #[serde(default)]
    configuration: Configuration,
    #[serde(default)]
    environments: BTreeMap<String, Configuration>,
    #[serde(default, rename = "secrets")]
    secrets: SecretNames,
}

impl Component {
    /// Create a component, recording its release version in the
    /// configuration metadata. An existing chart repository entry is kept.
    pub fn new(
        name: String,
        namespace: String,
        release: Release,
        configuration: Configuration,
        environments: BTreeMap<String, Configuration>,
        secret_names: SecretNames,
    ) -> Self {
        let mut configuration = configuration;
        let mut metadata = configuration.metadata().unwrap_or(Metadata {
            release_version: String::new(),
            chart_repository: String::new(),
        });
        metadata.release_version = release.version.clone();
        configuration.set_metadata(&metadata);

        Self {
            name,
            namespace,
            release,
            configuration,
            environments,
            secret_names,
            secret_values: SecretValues::new(),
        }
    }

    /// Parse a descriptor YAML document into a component
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawComponent = serde_yaml::from_str(content)?;

        let name = raw.name.filter(|n| !n.is_empty()).ok_or(CoreError::MissingField {
            field: "name".to_string(),
        })?;
        let release = raw.release.ok_or(CoreError::MissingField {
            field: "release".to_string(),
        })?;
        if release.chart.is_empty() {
            return Err(CoreError::MissingField {
                field: "release.chart".to_string(),
            });
        }
        if release.version.is_empty() {
            return Err(CoreError::MissingField {
                field: "release.version".to_string(),
            });
        }

        Ok(Component::new(
            name,
            raw.namespace,
            Release {
                chart: release.chart,
                version: release.version,
            },
            raw.configuration,
            raw.environments,
            raw.secrets,
        ))
    }

    /// Validate required fields and length limits
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidName {
                name: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.name.len() > NAME_MAX {
            return Err(CoreError::InvalidName {
                name: self.name.clone(),
                reason: format!("name exceeds {} characters", NAME_MAX),
            });
        }
        if self.release.chart.is_empty() {
            return Err(CoreError::MissingField {
                field: "release.chart".to_string(),
            });
        }
        if self.release.version.is_empty() {
            return Err(CoreError::MissingField {
                field: "release.version".to_string(),
            });
        }
        Ok(())
    }

    /// Structural equality for state comparison.
    ///
    /// Secret names are ignored: the cluster cannot reconstruct the lookup
    /// keys a user authored. Secret values do participate.
    pub fn equals(&self, other: &Component) -> bool {
        self.equals_except_secret_values(other) && self.secret_values == other.secret_values
    }

    /// Equality over everything but the secret bytes
    pub fn equals_except_secret_values(&self, other: &Component) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.release == other.release
            && self.configuration == other.configuration
            && self.environments == other.environments
    }

    /// Full chart reference `repository/name[:version]` from metadata
    pub fn full_chart_ref(&self) -> Result<String> {
        let metadata = self.configuration.metadata()?;
        Ok(format!("{}/{}", metadata.chart_repository, self.release.chart))
    }
}

/// Validate every component of a collection
pub fn validate_components(components: &Components) -> Result<()> {
    for component in components.values() {
        component.validate()?;
    }
    Ok(())
}
