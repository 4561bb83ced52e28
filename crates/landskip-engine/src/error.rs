//! Engine error types

use landskip_core::CoreError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A descriptor file could not be read or parsed
    #[error("descriptor `{file}` failed: {source}")]
    Descriptor {
        file: String,
        #[source]
        source: CoreError,
    },

    /// A component failed validation
    #[error("failed to validate `{file}`: {source}")]
    Validation {
        file: String,
        #[source]
        source: CoreError,
    },

    /// Two descriptors declare the same component name
    #[error("duplicate component name `{name}`")]
    DuplicateName { name: String },

    /// The global configuration override file is unusable
    #[error("configuration override `{file}` failed: {source}")]
    Override {
        file: String,
        #[source]
        source: CoreError,
    },

    /// A release is not controlled by landskip.
    ///
    /// Sentinel used while rehydrating the current state; callers skip the
    /// release and never propagate this.
    #[error("release is not controlled by landskip")]
    NonManaged,

    /// Chart loading, secret access and release operations surface here
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
