//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid component name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("bad release.chart: `{chart_ref}`, expecting `some_repo/some_name`")]
    BadChartRef { chart_ref: String },

    #[error("configuration has no metadata")]
    NoMetadata,

    #[error("Failed to load chart '{chart_ref}': {message}")]
    ChartLoad { chart_ref: String, message: String },

    #[error("Failed to read secret '{name}': {message}")]
    SecretRead { name: String, message: String },

    #[error("Secret store error for '{name}': {message}")]
    SecretStore { name: String, message: String },

    #[error("Release operation on '{release}' failed: {message}")]
    ReleaseOp { release: String, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
