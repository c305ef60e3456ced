//! Cellmaster object server
//!
//! Reference counting and garbage collection for master objects.
//!
//! - [`ObjectManager`]: ids, ref/unref through [`TypeHandler`]s, applying
//!   destroy-objects mutations
//! - [`GarbageCollector`]: the replicated zombie queue and its collect future
//! - [`GcSweeper`]: the leader-only periodic sweep
//!
//! # Example
//!
//! ```
//! use cellmaster_core_object::{CellTag, IdGenerator, ObjectType};
//! use cellmaster_hydra::PeerStatus;
//! use cellmaster_object_server::{GarbageCollector, GcMetrics};
//! use std::sync::Arc;
//!
//! let mut gc = GarbageCollector::new(Arc::new(PeerStatus::leader()), GcMetrics::new(), 100);
//! let id = IdGenerator::new(CellTag(1)).next(ObjectType::MapNode);
//!
//! gc.enqueue(id);
//! let batch = gc.prepare_sweep().unwrap();
//! assert_eq!(batch.object_ids, vec![id]);
//!
//! // Applying the committed batch
//! gc.dequeue(id);
//! assert_eq!(gc.zombie_count(), 0);
//! ```

pub mod config;
pub mod gc;
pub mod handler;
pub mod metrics;
pub mod object_manager;
pub mod sweeper;

pub use config::ObjectManagerConfig;
pub use gc::{CollectFuture, CollectHandle, DestroyObjectsRequest, GarbageCollector};
pub use handler::{HandlerRegistry, TypeHandler};
pub use metrics::GcMetrics;
pub use object_manager::{ObjectManager, ObjectManagerSnapshot};
pub use sweeper::{sweep_once, GcSweeper, SweepOutcome};
