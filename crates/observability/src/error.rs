//! Error types for metrics export

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SensorError>;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A metric was emitted with a different tag set than it was created with
    #[error("Metric {name} has labels {expected:?}, emitted with {found:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}
