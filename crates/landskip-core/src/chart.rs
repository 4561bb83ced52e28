//! Chart model, loader seam and values coalescing

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::values::Configuration;

/// Identity of a chart as declared in its `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
}

/// A loaded chart: identity, default values, and bundled subcharts
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub values: Configuration,
    pub dependencies: Vec<Chart>,
}

impl Chart {
    pub fn new(name: &str, version: &str, values: Configuration) -> Self {
        Self {
            metadata: ChartMetadata {
                name: name.to_string(),
                version: version.to_string(),
            },
            values,
            dependencies: Vec::new(),
        }
    }
}

/// Loads charts by reference, downloading or unpacking as needed.
///
/// `chart_ref` is `repo/name[:version]`. The returned path is the chart's
/// location on disk, suitable for handing to the release installer.
#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn load(&self, chart_ref: &str) -> Result<(Chart, PathBuf)>;
}

/// In-memory chart source, keyed by chart name.
///
/// Serves loads without touching the filesystem; useful for tests and for
/// embedders that bundle their charts.
#[derive(Debug, Clone, Default)]
pub struct StaticCharts {
    charts: std::collections::BTreeMap<String, Chart>,
    base: PathBuf,
}

impl StaticCharts {
    pub fn new() -> Self {
        Self {
            charts: std::collections::BTreeMap::new(),
            base: PathBuf::from("/charts"),
        }
    }

    pub fn with_charts(charts: impl IntoIterator<Item = Chart>) -> Self {
        let mut this = Self::new();
        for chart in charts {
            this.insert(chart);
        }
        this
    }

    pub fn insert(&mut self, chart: Chart) {
        self.charts.insert(chart.metadata.name.clone(), chart);
    }
}

#[async_trait]
impl ChartLoader for StaticCharts {
    async fn load(&self, chart_ref: &str) -> Result<(Chart, PathBuf)> {
        let not_found = || crate::error::CoreError::ChartLoad {
            chart_ref: chart_ref.to_string(),
            message: "chart not found".to_string(),
        };

        let (repo, rest) = chart_ref.split_once('/').ok_or_else(not_found)?;
        let (name, version) = parse_chart_ref(rest);

        let chart = self.charts.get(&name).cloned().ok_or_else(not_found)?;
        if let Some(version) = version {
            if version != chart.metadata.version {
                return Err(crate::error::CoreError::ChartLoad {
                    chart_ref: chart_ref.to_string(),
                    message: format!(
                        "version {} not available (have {})",
                        version, chart.metadata.version
                    ),
                });
            }
        }

        Ok((chart, self.base.join(repo).join(name)))
    }
}

/// Split a `name[:version]` reference into name and optional version
pub fn parse_chart_ref(chart_ref: &str) -> (String, Option<String>) {
    match chart_ref.split_once(':') {
        Some((name, version)) => (name.trim().to_string(), Some(version.trim().to_string())),
        None => (chart_ref.trim().to_string(), None),
    }
}

/// Compute the effective configuration a release of `chart` will see.
///
/// Chart defaults are merged beneath the user values (user wins), then each
/// dependency's defaults are resolved into the sub-tree named after it.
/// `global.*` is passed through to every dependency.
pub fn coalesce_values(chart: &Chart, user: &Configuration) -> Configuration {
    let mut config = user.clone();
    config.merge_defaults(&chart.values);

    for dependency in &chart.dependencies {
        let mut scoped = Configuration::new();
        if let Some(JsonValue::Object(global)) = config.get("global") {
            scoped.insert("global", JsonValue::Object(global.clone()));
        }
        if let Some(JsonValue::Object(sub)) = config.get(&dependency.metadata.name) {
            for (key, value) in sub {
                scoped.insert(key.clone(), value.clone());
            }
        }

        let resolved = coalesce_values(dependency, &scoped);
        config.insert(
            dependency.metadata.name.clone(),
            JsonValue::Object(resolved.0),
        );
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(yaml: &str) -> Configuration {
        Configuration::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_parse_chart_ref() {
        assert_eq!(
            parse_chart_ref("hdfs:0.0.7"),
            ("hdfs".to_string(), Some("0.0.7".to_string()))
        );
        assert_eq!(parse_chart_ref("hdfs"), ("hdfs".to_string(), None));
        assert_eq!(
            parse_chart_ref(" hello : 1.0.0 "),
            ("hello".to_string(), Some("1.0.0".to_string()))
        );
    }

    #[test]
    fn test_coalesce_user_wins_over_defaults() {
        let chart = Chart::new("hello", "0.1.0", cfg("message: xxx\nreplicas: 1\n"));
        let user = cfg("message: Hello\n");

        let result = coalesce_values(&chart, &user);

        assert_eq!(result.get("message").unwrap(), &json!("Hello"));
        assert_eq!(result.get("replicas").unwrap(), &json!(1));
    }

    #[test]
    fn test_coalesce_resolves_subchart_defaults() {
        let mut chart = Chart::new("parent", "1.0.0", cfg("top: here\n"));
        chart.dependencies.push(Chart::new(
            "redis",
            "7.0.0",
            cfg("enabled: false\nreplicas: 1\n"),
        ));

        let user = cfg("redis:\n  enabled: true\n");
        let result = coalesce_values(&chart, &user);

        assert_eq!(result.get("top").unwrap(), &json!("here"));
        let redis = result.get("redis").unwrap();
        assert_eq!(redis["enabled"], json!(true));
        assert_eq!(redis["replicas"], json!(1));
    }

    #[tokio::test]
    async fn test_static_charts_load() {
        let charts = StaticCharts::with_charts([Chart::new("hello", "1.3.37", cfg("message: xxx\n"))]);

        let (chart, path) = charts.load("local/hello").await.unwrap();
        assert_eq!(chart.metadata.version, "1.3.37");
        assert_eq!(path, PathBuf::from("/charts/local/hello"));

        let (chart, _) = charts.load("local/hello:1.3.37").await.unwrap();
        assert_eq!(chart.metadata.name, "hello");

        assert!(charts.load("local/hello:9.9.9").await.is_err());
        assert!(charts.load("local/absent").await.is_err());
        assert!(charts.load("no-repo").await.is_err());
    }

    #[test]
    fn test_coalesce_passes_global_to_subcharts() {
        let mut chart = Chart::new("parent", "1.0.0", Configuration::new());
        chart
            .dependencies
            .push(Chart::new("redis", "7.0.0", cfg("tag: latest\n")));

        let user = cfg("global:\n  registry: docker.io\n");
        let result = coalesce_values(&chart, &user);

        let redis = result.get("redis").unwrap();
        assert_eq!(redis["global"]["registry"], json!("docker.io"));
        assert_eq!(redis["tag"], json!("latest"));
        // global stays at the top level too
        assert_eq!(result.get("global").unwrap()["registry"], json!("docker.io"));
    }
}
