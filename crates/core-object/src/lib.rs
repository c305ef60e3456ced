//! Cellmaster Core Object: identity and lifetime primitives for master objects
//!
//! Every piece of replicated master state (chunks, nodes, transactions,
//! datacenters, jobs) is addressed by an [`ObjectId`]. Objects never point at
//! each other directly; they live in id-keyed [`ObjectTable`] arenas and refer
//! to one another by id, so tearing one side down can never leave a dangling
//! reference behind.
//!
//! # Components
//!
//! - **ObjectId**: 128-bit id encoding `{hash, cell tag, type, counter}`
//! - **IdGenerator**: deterministic, replicated, per-type sequential ids
//! - **make_random_id**: random ids for short-lived entities (jobs)
//! - **ReferenceCounter**: strong/weak counts plus staging bookkeeping
//! - **ObjectTable**: ordered arena keyed by id
//!
//! # Example
//!
//! ```
//! use cellmaster_core_object::{CellTag, IdGenerator, ObjectType, ReferenceCounter};
//!
//! let mut generator = IdGenerator::new(CellTag(1));
//! let id = generator.next(ObjectType::Chunk);
//! assert_eq!(id.object_type(), Some(ObjectType::Chunk));
//! assert_eq!(id.cell_tag(), CellTag(1));
//!
//! let mut counter = ReferenceCounter::new();
//! assert_eq!(counter.ref_object(), 1);
//! assert_eq!(counter.unref_object(), 0);
//! ```

pub mod error;
pub mod generator;
pub mod id;
pub mod ref_count;
pub mod table;

pub use error::{ObjectError, Result};
pub use generator::{make_random_id, IdGenerator};
pub use id::{cell_tag_from_id, counter_from_id, type_from_id, CellTag, ObjectId, ObjectType};
pub use ref_count::ReferenceCounter;
pub use table::{MasterObject, ObjectTable};
