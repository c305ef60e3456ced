//! Cellmaster Hydra: the consensus facade
//!
//! The master's replicated state is driven through a narrow interface:
//!
//! - [`HydraStatus`]: am I the leader, is there a quorum, am I replaying
//! - [`HydraManager`]: commit a mutation and learn whether it succeeded
//! - [`AutomatonInvoker`]: the single task that owns and mutates state
//! - [`PeriodicExecutor`]: leader-side background loops (GC sweeps)
//! - [`SaveContext`] / [`LoadContext`]: snapshot framing
//!
//! Leader election and log shipping live behind these traits. [`LocalHydra`]
//! is a single-peer implementation that applies commits in-process.
//!
//! # Example
//!
//! ```
//! use cellmaster_hydra::{AutomatonInvoker, HydraManager, LocalHydra, PeerStatus};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cellmaster_hydra::HydraError> {
//! let (invoker, _handle) = AutomatonInvoker::spawn("counter", 0u64);
//! let hydra = LocalHydra::new(
//!     invoker.clone(),
//!     Arc::new(PeerStatus::leader()),
//!     |state: &mut u64, delta: &u64| *state += *delta,
//! );
//!
//! hydra.commit_mutation(5).await?;
//! assert_eq!(invoker.call(|state| *state).await?, 5);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod invoker;
pub mod local;
pub mod manager;
pub mod periodic;
pub mod snapshot;

pub use error::{HydraError, Result};
pub use invoker::AutomatonInvoker;
pub use local::{LocalHydra, DEFAULT_CHANGELOG_CAPACITY};
pub use manager::{HydraManager, HydraStatus, PeerStatus};
pub use periodic::{PeriodicExecutor, PeriodicHandle};
pub use snapshot::{LoadContext, SaveContext, SNAPSHOT_MAGIC};
