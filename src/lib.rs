/*!
 * Cellmaster - master cell control plane
 *
 * Replicated master state for a storage cluster:
 * - Reference-counted objects with a replicated zombie queue, drained by a
 *   leader-driven garbage collector
 * - Chunk job tracking reconciled against node heartbeats
 * - Dispatch throttling and inter-DC bandwidth accounting
 * - Versioned snapshots of persistent state
 */

pub mod automaton;
pub mod bootstrap;
pub mod config;
pub mod config_manager;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod mutation;

// Re-export commonly used types
pub use automaton::{MasterAutomaton, SimpleObject, SnapshotSummary};
pub use bootstrap::{Bootstrap, MasterHydra};
pub use config::{CellConfig, DynamicClusterConfig, LogLevel, LoggingConfig, MasterConfig};
pub use config_manager::{ConfigManager, ConfigSubscription};
pub use error::{ErrorCategory, MasterError, Result};
pub use heartbeat::{
    process_heartbeat, HeartbeatRequest, HeartbeatResponse, JobScheduler, JobStatus,
    NullScheduler,
};
pub use mutation::MasterMutation;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
