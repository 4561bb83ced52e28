//! CLI error type with exit code mapping

use miette::Diagnostic;
use thiserror::Error;

use landskip_engine::EngineError;

use crate::exit_codes;

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Bad flags, arguments or environment
    #[error("{message}")]
    #[diagnostic(code(landskip::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Descriptor parsing or validation failed
    #[error("{message}")]
    #[diagnostic(code(landskip::cli::validation))]
    Validation { message: String },

    /// A reconcile tick failed
    #[error("{message}")]
    #[diagnostic(code(landskip::cli::reconcile))]
    Reconcile { message: String },

    /// Cluster or helm connection setup failed
    #[error("{message}")]
    #[diagnostic(code(landskip::cli::connect))]
    Connect { message: String },
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage {
            message: message.into(),
            help: None,
        }
    }

    /// The process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage { .. } => exit_codes::USAGE,
            CliError::Validation { .. } => exit_codes::VALIDATION_FAILED,
            CliError::Reconcile { .. } | CliError::Connect { .. } => exit_codes::RECONCILE_FAILED,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Descriptor { .. }
            | EngineError::Validation { .. }
            | EngineError::DuplicateName { .. }
            | EngineError::Override { .. } => CliError::Validation {
                message: e.to_string(),
            },
            _ => CliError::Reconcile {
                message: e.to_string(),
            },
        }
    }
}
