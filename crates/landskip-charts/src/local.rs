//! Chart loading from a local chart home directory
//!
//! The chart home is laid out as `<home>/<repo>/<name>` for unpacked
//! charts and `<home>/<repo>/<name>-<version>.tgz` for downloaded
//! archives. Archives are unpacked next to themselves on first use so the
//! next load hits the directory directly.

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use tar::Archive;
use tracing::debug;

use landskip_core::{parse_chart_ref, Chart, ChartLoader, ChartMetadata, Configuration};

use crate::error::{ChartsError, Result};

const UNPACKED_DIR: &str = ".unpacked";

/// Loads charts from a local chart home directory
#[derive(Debug, Clone)]
pub struct LocalCharts {
    home: PathBuf,
}

impl LocalCharts {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn load_ref(&self, chart_ref: &str) -> Result<(Chart, PathBuf)> {
        let (repo, rest) = chart_ref
            .split_once('/')
            .ok_or_else(|| ChartsError::BadReference {
                chart_ref: chart_ref.to_string(),
                reason: "expecting `some_repo/some_name[:version]`".to_string(),
            })?;
        let (name, version) = parse_chart_ref(rest);

        let repo_dir = self.home.join(repo);
        let chart_dir = repo_dir.join(&name);

        // An unpacked directory wins when it matches the requested version
        // (or when no version was requested).
        if chart_dir.is_dir() {
            let chart = load_chart_dir(&chart_dir)?;
            match &version {
                None => return Ok((chart, chart_dir)),
                Some(v) if *v == chart.metadata.version => return Ok((chart, chart_dir)),
                Some(_) => {}
            }
        }

        let archive = match &version {
            Some(v) => {
                let path = repo_dir.join(format!("{}-{}.tgz", name, v));
                path.is_file().then_some(path)
            }
            None => latest_archive(&repo_dir, &name)?,
        };

        let Some(archive) = archive else {
            // fall through to a precise error: a dir with the wrong version
            // is a mismatch, anything else is not found
            if chart_dir.is_dir() {
                let chart = load_chart_dir(&chart_dir)?;
                return Err(ChartsError::VersionMismatch {
                    chart_ref: chart_ref.to_string(),
                    requested: version.unwrap_or_default(),
                    found: chart.metadata.version,
                });
            }
            return Err(ChartsError::NotFound {
                chart_ref: chart_ref.to_string(),
            });
        };

        let unpacked = unpack_archive(&archive, &repo_dir.join(UNPACKED_DIR))?;
        let dir = unpacked.join(&name);
        let chart = load_chart_dir(&dir)?;

        if let Some(v) = &version {
            if *v != chart.metadata.version {
                return Err(ChartsError::VersionMismatch {
                    chart_ref: chart_ref.to_string(),
                    requested: v.clone(),
                    found: chart.metadata.version,
                });
            }
        }

        Ok((chart, dir))
    }
}

#[async_trait]
impl ChartLoader for LocalCharts {
    async fn load(&self, chart_ref: &str) -> landskip_core::Result<(Chart, PathBuf)> {
        debug!(chart_ref, home = %self.home.display(), "load chart");
        self.load_ref(chart_ref).map_err(Into::into)
    }
}

#[derive(Deserialize)]
struct ChartYaml {
    name: String,
    version: String,
}

/// Load a chart from an unpacked directory: `Chart.yaml`, optional
/// `values.yaml`, and any subcharts under `charts/`.
pub fn load_chart_dir(dir: &Path) -> Result<Chart> {
    let manifest_path = dir.join("Chart.yaml");
    let manifest = std::fs::read_to_string(&manifest_path).map_err(|e| {
        ChartsError::InvalidChart {
            path: dir.display().to_string(),
            message: format!("cannot read Chart.yaml: {}", e),
        }
    })?;
    let manifest: ChartYaml = serde_yaml::from_str(&manifest)?;

    let values_path = dir.join("values.yaml");
    let values = if values_path.is_file() {
        Configuration::from_yaml(&std::fs::read_to_string(&values_path)?).map_err(|e| {
            ChartsError::InvalidChart {
                path: dir.display().to_string(),
                message: format!("invalid values.yaml: {}", e),
            }
        })?
    } else {
        Configuration::new()
    };

    let mut dependencies = Vec::new();
    let charts_dir = dir.join("charts");
    if charts_dir.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&charts_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        for entry in entries {
            if entry.is_dir() {
                if entry.file_name().is_some_and(|n| n == UNPACKED_DIR) {
                    continue;
                }
                dependencies.push(load_chart_dir(&entry)?);
            } else if entry.extension().is_some_and(|ext| ext == "tgz") {
                let unpacked = unpack_archive(&entry, &charts_dir.join(UNPACKED_DIR))?;
                let mut subdirs: Vec<_> = std::fs::read_dir(&unpacked)?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect();
                subdirs.sort();
                for subdir in subdirs {
                    dependencies.push(load_chart_dir(&subdir)?);
                }
            }
        }
    }

    Ok(Chart {
        metadata: ChartMetadata {
            name: manifest.name,
            version: manifest.version,
        },
        values,
        dependencies,
    })
}

/// Unpack a `.tgz` chart archive under `dest/<archive-stem>`, once
fn unpack_archive(archive_path: &Path, dest: &Path) -> Result<PathBuf> {
    let stem = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ChartsError::InvalidChart {
            path: archive_path.display().to_string(),
            message: "archive has no file name".to_string(),
        })?;
    let target = dest.join(stem);
    if target.is_dir() {
        return Ok(target);
    }

    debug!(archive = %archive_path.display(), "unpack chart archive");
    std::fs::create_dir_all(&target)?;
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    archive.unpack(&target)?;

    Ok(target)
}

/// Newest archive named `<name>-<version>.tgz` in a repo directory
fn latest_archive(repo_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    if !repo_dir.is_dir() {
        return Ok(None);
    }

    let prefix = format!("{}-", name);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(repo_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "tgz")
                && p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.starts_with(&prefix))
        })
        .collect();

    candidates.sort();
    Ok(candidates.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_chart(dir: &Path, name: &str, version: &str, values: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut manifest = File::create(dir.join("Chart.yaml")).unwrap();
        writeln!(manifest, "name: {}\nversion: {}", name, version).unwrap();
        let mut vals = File::create(dir.join("values.yaml")).unwrap();
        write!(vals, "{}", values).unwrap();
    }

    fn pack_chart(src: &Path, archive_path: &Path, top_dir: &str) {
        let file = File::create(archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(top_dir, src).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn test_load_unpacked_chart() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join("local").join("hello-world");
        write_chart(&dir, "hello-world", "0.1.0", "message: xxx\n");

        let loader = LocalCharts::new(home.path());
        let (chart, path) = loader.load("local/hello-world").await.unwrap();

        assert_eq!(chart.metadata.name, "hello-world");
        assert_eq!(chart.metadata.version, "0.1.0");
        assert_eq!(chart.values.get("message").unwrap(), "xxx");
        assert_eq!(path, dir);
    }

    #[tokio::test]
    async fn test_load_versioned_match() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join("local").join("hello-world");
        write_chart(&dir, "hello-world", "0.1.0", "");

        let loader = LocalCharts::new(home.path());
        let (chart, _) = loader.load("local/hello-world:0.1.0").await.unwrap();
        assert_eq!(chart.metadata.version, "0.1.0");
    }

    #[tokio::test]
    async fn test_load_version_mismatch() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join("local").join("hello-world");
        write_chart(&dir, "hello-world", "0.1.0", "");

        let loader = LocalCharts::new(home.path());
        let err = loader.load("local/hello-world:9.9.9").await.unwrap_err();
        assert!(err.to_string().contains("9.9.9"));
    }

    #[tokio::test]
    async fn test_load_not_found() {
        let home = tempfile::tempdir().unwrap();
        let loader = LocalCharts::new(home.path());
        let err = loader.load("local/absent").await.unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[tokio::test]
    async fn test_bad_reference_without_repo() {
        let home = tempfile::tempdir().unwrap();
        let loader = LocalCharts::new(home.path());
        assert!(loader.load("no-repo-part").await.is_err());
    }

    #[tokio::test]
    async fn test_load_from_archive() {
        let home = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let src = staging.path().join("hello-cron");
        write_chart(&src, "hello-cron", "1.2.0", "schedule: daily\n");

        let repo_dir = home.path().join("local");
        std::fs::create_dir_all(&repo_dir).unwrap();
        pack_chart(&src, &repo_dir.join("hello-cron-1.2.0.tgz"), "hello-cron");

        let loader = LocalCharts::new(home.path());
        let (chart, path) = loader.load("local/hello-cron:1.2.0").await.unwrap();

        assert_eq!(chart.metadata.name, "hello-cron");
        assert_eq!(chart.values.get("schedule").unwrap(), "daily");
        assert!(path.ends_with("hello-cron"));

        // second load hits the unpacked directory
        let (again, _) = loader.load("local/hello-cron:1.2.0").await.unwrap();
        assert_eq!(again.metadata.version, "1.2.0");
    }

    #[tokio::test]
    async fn test_unversioned_picks_latest_archive() {
        let home = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();

        for version in ["0.9.0", "1.1.0"] {
            let src = staging.path().join(version).join("hello-cron");
            write_chart(&src, "hello-cron", version, "");
            let repo_dir = home.path().join("local");
            std::fs::create_dir_all(&repo_dir).unwrap();
            pack_chart(
                &src,
                &repo_dir.join(format!("hello-cron-{}.tgz", version)),
                "hello-cron",
            );
        }

        let loader = LocalCharts::new(home.path());
        let (chart, _) = loader.load("local/hello-cron").await.unwrap();
        assert_eq!(chart.metadata.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_subcharts_loaded() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join("local").join("parent");
        write_chart(&dir, "parent", "1.0.0", "top: here\n");
        write_chart(
            &dir.join("charts").join("redis"),
            "redis",
            "7.0.0",
            "enabled: false\n",
        );

        let loader = LocalCharts::new(home.path());
        let (chart, _) = loader.load("local/parent").await.unwrap();

        assert_eq!(chart.dependencies.len(), 1);
        assert_eq!(chart.dependencies[0].metadata.name, "redis");
    }
}
