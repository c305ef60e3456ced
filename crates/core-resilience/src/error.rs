//! Error types for throttler construction

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThrottlerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThrottlerError {
    /// Limit was explicitly set to zero
    #[error("Throttler limit must be > 0 (omit it for unlimited)")]
    ZeroLimit,

    /// Period is zero or too small to split across the limit
    #[error("Invalid throttler period: {0}ms")]
    InvalidPeriod(u64),
}
