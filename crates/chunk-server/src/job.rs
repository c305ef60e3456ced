//! Master-side view of a node job
//!
//! A job refers to its node and chunk by id only. The chunk may be destroyed
//! while the job is in flight; lookups through the chunk manager simply come
//! back empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

use cellmaster_core_object::ObjectId;

use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobType {
    ReplicateChunk,
    RemoveChunk,
    RepairChunk,
    SealChunk,
    MergeChunks,
}

impl JobType {
    /// Every job type the master dispatches
    pub const ALL: [JobType; 5] = [
        JobType::ReplicateChunk,
        JobType::RemoveChunk,
        JobType::RepairChunk,
        JobType::SealChunk,
        JobType::MergeChunks,
    ];

    /// Bytes this job moves between data centers, if it is charged for it
    pub fn chargeable_size(&self, usage: &NodeResources) -> Option<i64> {
        match self {
            JobType::ReplicateChunk => Some(usage.replication_data_size),
            JobType::RepairChunk => Some(usage.repair_data_size),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobType::ReplicateChunk => "replicate_chunk",
            JobType::RemoveChunk => "remove_chunk",
            JobType::RepairChunk => "repair_chunk",
            JobType::SealChunk => "seal_chunk",
            JobType::MergeChunks => "merge_chunks",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Waiting,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobErrorCode {
    Generic,
    NoSuchChunk,
    Timeout,
    Canceled,
}

/// Error reported by a node for a failed or aborted job
///
/// Node errors are nested; `inner` holds the causes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: JobErrorCode,
    pub message: String,
    #[serde(default)]
    pub inner: Vec<JobError>,
}

impl JobError {
    pub fn new(code: JobErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            inner: Vec::new(),
        }
    }

    pub fn with_inner(mut self, inner: JobError) -> Self {
        self.inner.push(inner);
        self
    }

    /// Whether this error or any nested cause carries `code`
    pub fn find_matching(&self, code: JobErrorCode) -> bool {
        self.code == code || self.inner.iter().any(|inner| inner.find_matching(code))
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)?;
        for inner in &self.inner {
            write!(f, " <- {}", inner)?;
        }
        Ok(())
    }
}

/// Node resource vector, used both for usage and for limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    pub replication_slots: i32,
    pub removal_slots: i32,
    pub repair_slots: i32,
    pub seal_slots: i32,
    pub merge_slots: i32,
    pub replication_data_size: i64,
    pub repair_data_size: i64,
    pub merge_data_size: i64,
}

impl AddAssign<&NodeResources> for NodeResources {
    fn add_assign(&mut self, rhs: &NodeResources) {
        self.replication_slots += rhs.replication_slots;
        self.removal_slots += rhs.removal_slots;
        self.repair_slots += rhs.repair_slots;
        self.seal_slots += rhs.seal_slots;
        self.merge_slots += rhs.merge_slots;
        self.replication_data_size += rhs.replication_data_size;
        self.repair_data_size += rhs.repair_data_size;
        self.merge_data_size += rhs.merge_data_size;
    }
}

/// Administrative per-node caps; unset fields leave the limit alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResourceLimitsOverrides {
    pub replication_slots: Option<i32>,
    pub removal_slots: Option<i32>,
    pub repair_slots: Option<i32>,
    pub seal_slots: Option<i32>,
    pub merge_slots: Option<i32>,
    pub replication_data_size: Option<i64>,
    pub repair_data_size: Option<i64>,
    pub merge_data_size: Option<i64>,
}

impl NodeResourceLimitsOverrides {
    /// Tighten `limits`; an override never raises a limit
    pub fn apply(&self, limits: &mut NodeResources) {
        fn tighten<T: Ord + Copy>(limit: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *limit = (*limit).min(value);
            }
        }

        tighten(&mut limits.replication_slots, self.replication_slots);
        tighten(&mut limits.removal_slots, self.removal_slots);
        tighten(&mut limits.repair_slots, self.repair_slots);
        tighten(&mut limits.seal_slots, self.seal_slots);
        tighten(&mut limits.merge_slots, self.merge_slots);
        tighten(&mut limits.replication_data_size, self.replication_data_size);
        tighten(&mut limits.repair_data_size, self.repair_data_size);
        tighten(&mut limits.merge_data_size, self.merge_data_size);
    }
}

/// A chunk replica as stored on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkIdWithIndexes {
    pub chunk_id: ObjectId,
    pub replica_index: i32,
    pub medium_index: i32,
}

impl ChunkIdWithIndexes {
    pub fn new(chunk_id: ObjectId) -> Self {
        Self {
            chunk_id,
            replica_index: 0,
            medium_index: 0,
        }
    }
}

impl fmt::Display for ChunkIdWithIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.chunk_id, self.replica_index, self.medium_index
        )
    }
}

/// Where a job writes a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetReplica {
    pub node_id: NodeId,
    pub replica_index: i32,
    pub medium_index: i32,
}

impl TargetReplica {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            replica_index: 0,
            medium_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    job_id: ObjectId,
    job_type: JobType,
    node_id: NodeId,
    chunk_id_with_indexes: ChunkIdWithIndexes,
    resource_usage: NodeResources,
    target_replicas: Vec<TargetReplica>,
    state: JobState,
    start_time: DateTime<Utc>,
    error: Option<JobError>,
}

impl Job {
    /// A freshly scheduled job, waiting and started now
    pub fn new(
        job_id: ObjectId,
        job_type: JobType,
        node_id: NodeId,
        chunk_id_with_indexes: ChunkIdWithIndexes,
        resource_usage: NodeResources,
        target_replicas: Vec<TargetReplica>,
    ) -> Self {
        Self {
            job_id,
            job_type,
            node_id,
            chunk_id_with_indexes,
            resource_usage,
            target_replicas,
            state: JobState::Waiting,
            start_time: Utc::now(),
            error: None,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn job_id(&self) -> ObjectId {
        self.job_id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn chunk_id_with_indexes(&self) -> ChunkIdWithIndexes {
        self.chunk_id_with_indexes
    }

    pub fn chunk_id(&self) -> ObjectId {
        self.chunk_id_with_indexes.chunk_id
    }

    pub fn resource_usage(&self) -> &NodeResources {
        &self.resource_usage
    }

    pub fn target_replicas(&self) -> &[TargetReplica] {
        &self.target_replicas
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: Option<JobError>) {
        self.error = error;
    }

    /// Bytes charged against inter-DC edges, if any
    pub fn chargeable_size(&self) -> Option<i64> {
        self.job_type.chargeable_size(&self.resource_usage)
    }
}
