//! Landskip chart loading
//!
//! Provides the production `ChartLoader`: a local chart home directory of
//! unpacked charts and `.tgz` archives, organised per repository.

pub mod error;
pub mod local;

pub use error::{ChartsError, Result};
pub use local::{load_chart_dir, LocalCharts};
