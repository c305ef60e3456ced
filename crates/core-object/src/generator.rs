//! Id generation
//!
//! Replicated objects get sequential ids from an [`IdGenerator`]: every
//! replica applying the same mutations produces the same ids because the
//! counters are part of the persisted state. Short-lived entities that never
//! enter replicated state (node jobs) use [`make_random_id`] instead.

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::collections::BTreeMap;
use std::hash::Hasher;

use crate::id::{CellTag, ObjectId, ObjectType};

const ID_HASH_SEED: u64 = 0x6365_6c6c_6d61_7374;

/// Deterministic per-type id generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    cell_tag: CellTag,
    counters: BTreeMap<ObjectType, u64>,
}

impl IdGenerator {
    pub fn new(cell_tag: CellTag) -> Self {
        Self {
            cell_tag,
            counters: BTreeMap::new(),
        }
    }

    /// Produce the next id for `object_type`
    pub fn next(&mut self, object_type: ObjectType) -> ObjectId {
        let counter = self.counters.entry(object_type).or_insert(0);
        *counter += 1;
        let counter = *counter;

        let mut hasher = SipHasher13::new_with_keys(ID_HASH_SEED, self.cell_tag.0 as u64);
        hasher.write_u64(counter);
        hasher.write_u16(object_type as u16);
        hasher.write_u16(self.cell_tag.0);
        let hash = hasher.finish() as u32;

        ObjectId::make(object_type, self.cell_tag, counter, hash)
    }

    /// Number of ids handed out for `object_type` so far
    pub fn counter(&self, object_type: ObjectType) -> u64 {
        self.counters.get(&object_type).copied().unwrap_or(0)
    }

    pub fn cell_tag(&self) -> CellTag {
        self.cell_tag
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

/// Random id tagged with type and cell
///
/// Uniqueness is probabilistic; callers do not check for collisions.
pub fn make_random_id(object_type: ObjectType, cell_tag: CellTag) -> ObjectId {
    let counter: u64 = rand::random();
    let hash: u32 = rand::random();
    ObjectId::make(object_type, cell_tag, counter, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_counters_per_type() {
        let mut generator = IdGenerator::new(CellTag(1));

        let a = generator.next(ObjectType::Chunk);
        let b = generator.next(ObjectType::Chunk);
        let c = generator.next(ObjectType::MapNode);

        assert_eq!(a.counter(), 1);
        assert_eq!(b.counter(), 2);
        assert_eq!(c.counter(), 1);
        assert_ne!(a, b);
        assert_eq!(generator.counter(ObjectType::Chunk), 2);
        assert_eq!(generator.counter(ObjectType::Account), 0);
    }

    #[test]
    fn test_replicas_generate_identical_ids() {
        let mut first = IdGenerator::new(CellTag(5));
        let mut second = IdGenerator::new(CellTag(5));

        for _ in 0..16 {
            assert_eq!(
                first.next(ObjectType::Transaction),
                second.next(ObjectType::Transaction)
            );
        }
    }

    #[test]
    fn test_generator_state_survives_serialization() {
        let mut generator = IdGenerator::new(CellTag(2));
        generator.next(ObjectType::Chunk);
        generator.next(ObjectType::Chunk);

        let bytes = bincode::serialize(&generator).unwrap();
        let mut restored: IdGenerator = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored, generator);
        assert_eq!(restored.next(ObjectType::Chunk), generator.next(ObjectType::Chunk));
    }

    #[test]
    fn test_reset() {
        let mut generator = IdGenerator::new(CellTag(2));
        let first = generator.next(ObjectType::Chunk);
        generator.reset();
        assert_eq!(generator.next(ObjectType::Chunk), first);
    }

    #[test]
    fn test_random_id_is_tagged() {
        let a = make_random_id(ObjectType::MasterJob, CellTag(9));
        let b = make_random_id(ObjectType::MasterJob, CellTag(9));

        assert_eq!(a.object_type(), Some(ObjectType::MasterJob));
        assert_eq!(a.cell_tag(), CellTag(9));
        assert_ne!(a, b);
    }
}
