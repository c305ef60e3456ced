//! Cellmaster chunk server
//!
//! Job bookkeeping for chunk replication, repair and removal.
//!
//! - [`JobTracker`]: registration, per-heartbeat reconciliation, dispatch
//!   throttling and profiling
//! - [`DataCenterEdgeTable`]: inter-DC bandwidth consumption against
//!   configured capacities
//! - [`NodeTracker`] and [`ChunkManager`]: the node, data center and chunk
//!   state jobs refer to by id
//!
//! # Example
//!
//! ```
//! use cellmaster_chunk_server::{
//!     ChunkIdWithIndexes, ChunkManager, DynamicChunkManagerConfig, Job, JobContext, JobTracker,
//!     JobType, NodeResources, NodeTracker, TargetReplica,
//! };
//! use cellmaster_core_object::{CellTag, IdGenerator, ObjectType};
//! use std::sync::Arc;
//!
//! let mut tracker =
//!     JobTracker::new(CellTag(1), 0, Arc::new(DynamicChunkManagerConfig::default())).unwrap();
//! let mut nodes = NodeTracker::new();
//! let mut chunks = ChunkManager::new();
//!
//! let node = nodes.register_node("node-1:9012");
//! let chunk_id = IdGenerator::new(CellTag(1)).next(ObjectType::Chunk);
//! chunks.create_chunk(chunk_id);
//!
//! let job = Job::new(
//!     tracker.generate_job_id(),
//!     JobType::ReplicateChunk,
//!     node,
//!     ChunkIdWithIndexes::new(chunk_id),
//!     NodeResources::default(),
//!     vec![TargetReplica::new(node)],
//! );
//!
//! let mut context = JobContext {
//!     node_tracker: &mut nodes,
//!     chunk_manager: &mut chunks,
//! };
//! let mut to_start = Vec::new();
//! let mut usage = NodeResources::default();
//! tracker
//!     .register_job(Some(job), &mut to_start, &mut usage, &mut context)
//!     .unwrap();
//! assert_eq!(tracker.counters(JobType::ReplicateChunk).running, 1);
//! ```

pub mod chunk;
pub mod config;
pub mod edge_table;
pub mod error;
pub mod job;
pub mod job_tracker;
pub mod node;

pub use chunk::{Chunk, ChunkManager};
pub use config::{CapacitiesByName, DynamicChunkManagerConfig, InterDcCapacity, InterDcLimitsConfig};
pub use edge_table::{DataCenterEdgeTable, EdgeEnd, EdgeMatrix};
pub use error::{ChunkServerError, Result};
pub use job::{
    ChunkIdWithIndexes, Job, JobError, JobErrorCode, JobState, JobType, NodeResourceLimitsOverrides,
    NodeResources, TargetReplica,
};
pub use job_tracker::{JobContext, JobTracker, JobTypeCounters};
pub use node::{DataCenter, DataCenterDirectory, DataCenterId, Node, NodeId, NodeTracker};
