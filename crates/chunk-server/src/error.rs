//! Error types for chunk and node bookkeeping

use cellmaster_core_object::ObjectId;
use cellmaster_core_resilience::ThrottlerError;
use thiserror::Error;

use crate::node::NodeId;

pub type Result<T> = std::result::Result<T, ChunkServerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkServerError {
    #[error("No such node: {0}")]
    NoSuchNode(NodeId),

    #[error("No such data center: {0}")]
    NoSuchDataCenter(ObjectId),

    #[error("Data center {0:?} already exists")]
    DuplicateDataCenter(String),

    #[error("Invalid data center name: {0:?}")]
    InvalidDataCenterName(String),

    #[error("No data center named {0:?}")]
    UnknownDataCenter(String),

    #[error("No such chunk: {0}")]
    NoSuchChunk(ObjectId),

    #[error("Negative inter-DC capacity {capacity} for edge {source_dc:?} -> {destination_dc:?}")]
    NegativeCapacity {
        source_dc: Option<String>,
        destination_dc: Option<String>,
        capacity: i64,
    },

    #[error("Throttler error: {0}")]
    Throttler(#[from] ThrottlerError),
}
