//! Landskip Core - shared types for the landskip reconciler
//!
//! This crate provides the foundational types used throughout landskip:
//! - `Component`: the record for one managed release
//! - `Configuration`: values with deep merge and ownership metadata
//! - `Chart` and `ChartLoader`: the chart model and loader seam
//! - `ReleaseClient`: the package manager seam
//! - `SecretsReader` / `SecretsWriter`: the secret source and store seams

pub mod chart;
pub mod client;
pub mod component;
pub mod error;
pub mod secrets;
pub mod values;

pub use chart::{coalesce_values, parse_chart_ref, Chart, ChartLoader, ChartMetadata, StaticCharts};
pub use client::{
    InstallOptions, InstalledRelease, ReleaseClient, ReleaseSummary, UpgradeOptions,
};
pub use component::{validate_components, Component, Components, Release, NAME_MAX};
pub use error::{CoreError, Result};
pub use secrets::{
    env_key, EnvironmentSecrets, SecretNames, SecretValues, SecretsReader, SecretsWriter,
};
pub use values::{Configuration, Metadata, METADATA_KEY};
