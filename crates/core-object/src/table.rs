//! Id-keyed object arena
//!
//! Objects live in an [`ObjectTable`] and are referenced by id everywhere
//! else. Destroying an object means removing its entry; anyone still holding
//! the id gets `None` from [`ObjectTable::find`] and treats it as a lost race.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::ObjectId;
use crate::ref_count::ReferenceCounter;

/// Capability every object stored in an [`ObjectTable`] provides
pub trait MasterObject {
    fn id(&self) -> ObjectId;

    fn ref_counter(&self) -> &ReferenceCounter;

    fn ref_counter_mut(&mut self) -> &mut ReferenceCounter;

    fn is_alive(&self) -> bool {
        self.ref_counter().is_alive()
    }
}

/// Ordered arena of objects keyed by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTable<T> {
    objects: BTreeMap<ObjectId, T>,
}

impl<T> Default for ObjectTable<T> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }
}

impl<T: MasterObject> ObjectTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new object
    ///
    /// # Panics
    ///
    /// Panics if an object with the same id is already present.
    pub fn insert(&mut self, object: T) -> &mut T {
        let id = object.id();
        assert!(
            !self.objects.contains_key(&id),
            "Duplicate object id {}",
            id
        );
        self.objects.entry(id).or_insert(object)
    }

    pub fn find(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(&id)
    }

    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.objects.get_mut(&id)
    }

    /// Like [`find`](Self::find) but the object must exist
    ///
    /// # Panics
    ///
    /// Panics if there is no such object.
    pub fn get(&self, id: ObjectId) -> &T {
        self.objects
            .get(&id)
            .unwrap_or_else(|| panic!("No such object {}", id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut T {
        self.objects
            .get_mut(&id)
            .unwrap_or_else(|| panic!("No such object {}", id))
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        self.objects.remove(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &T)> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ObjectId, &mut T)> {
        self.objects.iter_mut()
    }

    /// Objects holding at least one strong reference
    pub fn alive(&self) -> impl Iterator<Item = &T> {
        self.objects.values().filter(|object| object.is_alive())
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        id: ObjectId,
        refs: ReferenceCounter,
    }

    impl Dummy {
        fn new(counter: u32) -> Self {
            Self {
                id: ObjectId::from_parts(counter, 0x1_0001, counter, 0),
                refs: ReferenceCounter::new(),
            }
        }
    }

    impl MasterObject for Dummy {
        fn id(&self) -> ObjectId {
            self.id
        }

        fn ref_counter(&self) -> &ReferenceCounter {
            &self.refs
        }

        fn ref_counter_mut(&mut self) -> &mut ReferenceCounter {
            &mut self.refs
        }
    }

    #[test]
    fn test_insert_find_remove() {
        let mut table = ObjectTable::new();
        let dummy = Dummy::new(1);
        let id = dummy.id;

        table.insert(dummy);
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(id).map(|d| d.id), Some(id));

        assert!(table.remove(id).is_some());
        assert!(table.find(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "Duplicate object id")]
    fn test_duplicate_insert_panics() {
        let mut table = ObjectTable::new();
        table.insert(Dummy::new(1));
        table.insert(Dummy::new(1));
    }

    #[test]
    #[should_panic(expected = "No such object")]
    fn test_get_missing_panics() {
        let table: ObjectTable<Dummy> = ObjectTable::new();
        table.get(ObjectId::from_parts(1, 1, 1, 1));
    }

    #[test]
    fn test_alive_filters_zero_refs() {
        let mut table = ObjectTable::new();
        table.insert(Dummy::new(1)).refs.ref_object();
        table.insert(Dummy::new(2));

        let alive: Vec<_> = table.alive().map(|d| d.id).collect();
        assert_eq!(alive, vec![Dummy::new(1).id]);
    }

    #[test]
    fn test_iteration_order_is_by_id() {
        let mut table = ObjectTable::new();
        for counter in [5, 1, 3] {
            table.insert(Dummy::new(counter));
        }

        let order: Vec<u32> = table.ids().map(|id| id.hash_part()).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn test_table_serialization() {
        let mut table = ObjectTable::new();
        table.insert(Dummy::new(1)).refs.ref_object();
        table.insert(Dummy::new(2));

        let bytes = bincode::serialize(&table).unwrap();
        let restored: ObjectTable<Dummy> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, table);
    }
}
