/*!
 * Error types for the cellmaster
 */

use std::fmt;
use std::io;
use thiserror::Error;

use cellmaster_chunk_server::ChunkServerError;
use cellmaster_core_object::{ObjectError, ObjectType};
use cellmaster_core_resilience::ThrottlerError;
use cellmaster_hydra::HydraError;
use cellmaster_observability::SensorError;

pub type Result<T> = std::result::Result<T, MasterError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Error, Debug)]
pub enum MasterError {
    /// Configuration is well-formed but not acceptable
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Consensus error: {0}")]
    Hydra(#[from] HydraError),

    #[error("Object error: {0}")]
    Object(#[from] ObjectError),

    #[error("Objects of type {0} cannot be created directly")]
    UnsupportedObjectType(ObjectType),

    #[error("Chunk server error: {0}")]
    ChunkServer(#[from] ChunkServerError),

    #[error("Throttler error: {0}")]
    Throttler(#[from] ThrottlerError),

    #[error("Metrics error: {0}")]
    Sensor(#[from] SensorError),
}

impl MasterError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            MasterError::Hydra(e) => e.is_transient(),
            MasterError::Io(e) => Self::is_io_transient(e),
            _ => false,
        }
    }

    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            Interrupted | WouldBlock | TimedOut | WriteZero
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            MasterError::Config(_)
            | MasterError::ConfigParse(_)
            | MasterError::ConfigSerialize(_)
            | MasterError::Throttler(_) => ErrorCategory::Configuration,
            MasterError::Io(_) => ErrorCategory::IoError,
            MasterError::Hydra(HydraError::Io(_)) => ErrorCategory::IoError,
            MasterError::Hydra(
                HydraError::InvalidSnapshot(_)
                | HydraError::UnsupportedVersion { .. }
                | HydraError::Serialization(_),
            ) => ErrorCategory::Snapshot,
            MasterError::Hydra(_) => ErrorCategory::Consensus,
            MasterError::Object(_) | MasterError::UnsupportedObjectType(_) => {
                ErrorCategory::Object
            }
            MasterError::ChunkServer(ChunkServerError::Throttler(_))
            | MasterError::ChunkServer(ChunkServerError::NegativeCapacity { .. }) => {
                ErrorCategory::Configuration
            }
            MasterError::ChunkServer(_) => ErrorCategory::Topology,
            MasterError::Sensor(_) => ErrorCategory::Observability,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or rejected configuration
    Configuration,
    /// I/O operation errors
    IoError,
    /// Unreadable or incompatible snapshots
    Snapshot,
    /// Leadership, quorum and commit failures
    Consensus,
    /// Unknown objects or unhandled object types
    Object,
    /// Nodes, data centers and chunks
    Topology,
    /// Metrics export
    Observability,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Snapshot => write!(f, "snapshot"),
            ErrorCategory::Consensus => write!(f, "consensus"),
            ErrorCategory::Object => write!(f, "object"),
            ErrorCategory::Topology => write!(f, "topology"),
            ErrorCategory::Observability => write!(f, "observability"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::{CellTag, ObjectId};

    #[test]
    fn test_lost_leadership_is_transient() {
        let err = MasterError::from(HydraError::NotLeader);
        assert!(err.is_transient());
        assert_eq!(err.category(), ErrorCategory::Consensus);
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_stopped_automaton_is_terminal() {
        let err = MasterError::from(HydraError::AutomatonStopped);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_snapshot_errors_are_categorized() {
        let err = MasterError::from(HydraError::UnsupportedVersion {
            found: 9,
            min: 1,
            max: 1,
        });
        assert_eq!(err.category(), ErrorCategory::Snapshot);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_errors_exit_with_config_code() {
        let err = MasterError::from(ThrottlerError::ZeroLimit);
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.exit_code(), EXIT_CONFIG);

        let err = MasterError::Config("cell_tag must be non-zero".to_string());
        assert_eq!(err.to_string(), "Configuration error: cell_tag must be non-zero");
    }

    #[test]
    fn test_object_errors_keep_their_message() {
        let id = ObjectId::make(ObjectType::Chunk, CellTag(1), 7, 0);
        let err = MasterError::from(ObjectError::NoSuchObject(id));
        assert_eq!(err.category(), ErrorCategory::Object);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_io_transience() {
        let err = MasterError::from(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        assert!(err.is_transient());

        let err = MasterError::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(!err.is_transient());
        assert_eq!(err.category(), ErrorCategory::IoError);
    }
}
