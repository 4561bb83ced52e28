//! Error types for landskip-charts

use thiserror::Error;

/// Result type for chart loading operations
pub type Result<T> = std::result::Result<T, ChartsError>;

#[derive(Debug, Error)]
pub enum ChartsError {
    #[error("chart not found: {chart_ref}")]
    NotFound { chart_ref: String },

    #[error("bad chart reference `{chart_ref}`: {reason}")]
    BadReference { chart_ref: String, reason: String },

    #[error("chart at {path} is invalid: {message}")]
    InvalidChart { path: String, message: String },

    #[error(
        "chart `{chart_ref}` has version {found}, requested {requested}"
    )]
    VersionMismatch {
        chart_ref: String,
        requested: String,
        found: String,
    },

    #[error("Failed to parse Chart.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ChartsError> for landskip_core::CoreError {
    fn from(e: ChartsError) -> Self {
        let chart_ref = match &e {
            ChartsError::NotFound { chart_ref }
            | ChartsError::BadReference { chart_ref, .. }
            | ChartsError::VersionMismatch { chart_ref, .. } => chart_ref.clone(),
            _ => String::new(),
        };
        landskip_core::CoreError::ChartLoad {
            chart_ref,
            message: e.to_string(),
        }
    }
}
