//! Error types for the consensus facade

use thiserror::Error;

/// Result type for hydra operations
pub type Result<T> = std::result::Result<T, HydraError>;

#[derive(Error, Debug)]
pub enum HydraError {
    /// This peer does not lead the cell
    #[error("Not a leader")]
    NotLeader,

    /// Leader has lost contact with a quorum of followers
    #[error("No active quorum")]
    NoQuorum,

    /// The mutation was not committed
    #[error("Mutation commit failed: {0}")]
    CommitFailed(String),

    /// The automaton task has exited
    #[error("Automaton is stopped")]
    AutomatonStopped,

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Unsupported snapshot version {found} (supported {min}..={max})")]
    UnsupportedVersion { found: u32, min: u32, max: u32 },

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl HydraError {
    /// Whether a later attempt may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HydraError::NotLeader | HydraError::NoQuorum | HydraError::CommitFailed(_)
        )
    }
}
