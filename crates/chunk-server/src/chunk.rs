//! Chunk table
//!
//! Only the parts of a chunk that job bookkeeping touches live here: the
//! reference counter and the id of the job currently working on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use tracing::debug;

use cellmaster_core_object::{MasterObject, ObjectId, ObjectTable, ReferenceCounter};
use cellmaster_hydra::{LoadContext, SaveContext};
use cellmaster_object_server::TypeHandler;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    id: ObjectId,
    refs: ReferenceCounter,
    /// Jobs are not persisted, so neither is the link to one
    #[serde(skip)]
    job: Option<ObjectId>,
}

impl Chunk {
    pub fn job(&self) -> Option<ObjectId> {
        self.job
    }

    pub fn set_job(&mut self, job: Option<ObjectId>) {
        self.job = job;
    }
}

impl MasterObject for Chunk {
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

#[derive(Debug, Default)]
pub struct ChunkManager {
    chunks: ObjectTable<Chunk>,
    refresh_queue: BTreeSet<ObjectId>,
}

impl ChunkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chunk holding its creation reference
    pub fn create_chunk(&mut self, id: ObjectId) -> &mut Chunk {
        let mut refs = ReferenceCounter::new();
        refs.ref_object();
        debug!(chunk_id = %id, "Chunk created");
        self.chunks.insert(Chunk {
            id,
            refs,
            job: None,
        })
    }

    pub fn find_chunk(&self, id: ObjectId) -> Option<&Chunk> {
        self.chunks.find(id)
    }

    pub fn find_chunk_mut(&mut self, id: ObjectId) -> Option<&mut Chunk> {
        self.chunks.find_mut(id)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().map(|(_, chunk)| chunk)
    }

    /// Ask the replicator to look at this chunk again
    pub fn schedule_chunk_refresh(&mut self, id: ObjectId) {
        if self.chunks.contains(id) {
            self.refresh_queue.insert(id);
        }
    }

    pub fn refresh_queue(&self) -> &BTreeSet<ObjectId> {
        &self.refresh_queue
    }

    pub fn take_refresh_queue(&mut self) -> BTreeSet<ObjectId> {
        std::mem::take(&mut self.refresh_queue)
    }

    pub fn save<W: Write>(&self, context: &mut SaveContext<W>) -> cellmaster_hydra::Result<()> {
        context.save(&self.chunks)
    }

    pub fn load<R: Read>(&mut self, context: &mut LoadContext<R>) -> cellmaster_hydra::Result<()> {
        self.chunks = context.load()?;
        self.refresh_queue.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.refresh_queue.clear();
    }
}

impl TypeHandler for ChunkManager {
    fn find_ref_counter(&self, id: ObjectId) -> Option<&ReferenceCounter> {
        self.chunks.find_ref_counter(id)
    }

    fn find_ref_counter_mut(&mut self, id: ObjectId) -> Option<&mut ReferenceCounter> {
        self.chunks.find_ref_counter_mut(id)
    }

    fn destroy_object(&mut self, id: ObjectId) -> bool {
        self.refresh_queue.remove(&id);
        match self.chunks.remove(id) {
            Some(chunk) => {
                debug!(chunk_id = %id, job_id = ?chunk.job, "Chunk destroyed");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::{CellTag, IdGenerator, ObjectType};

    #[test]
    fn test_refresh_queue_ignores_missing_chunks() {
        let mut generator = IdGenerator::new(CellTag(1));
        let mut manager = ChunkManager::new();
        let id = generator.next(ObjectType::Chunk);
        manager.create_chunk(id);

        manager.schedule_chunk_refresh(id);
        manager.schedule_chunk_refresh(generator.next(ObjectType::Chunk));

        assert_eq!(manager.take_refresh_queue().into_iter().collect::<Vec<_>>(), vec![id]);
        assert!(manager.refresh_queue().is_empty());
    }

    #[test]
    fn test_destroy_through_type_handler() {
        let mut generator = IdGenerator::new(CellTag(1));
        let mut manager = ChunkManager::new();
        let id = generator.next(ObjectType::Chunk);
        manager.create_chunk(id);
        manager.schedule_chunk_refresh(id);

        assert_eq!(manager.find_ref_counter(id).unwrap().ref_counter(), 1);
        assert!(manager.destroy_object(id));
        assert!(!manager.destroy_object(id));
        assert!(manager.find_chunk(id).is_none());
        assert!(manager.refresh_queue().is_empty());
    }

    #[test]
    fn test_snapshot_drops_job_links() {
        let mut generator = IdGenerator::new(CellTag(1));
        let mut manager = ChunkManager::new();
        let id = generator.next(ObjectType::Chunk);
        let job_id = generator.next(ObjectType::MasterJob);
        manager.create_chunk(id).set_job(Some(job_id));

        let mut save = SaveContext::new(Vec::new(), 1).unwrap();
        manager.save(&mut save).unwrap();
        let bytes = save.finish().unwrap();

        let mut restored = ChunkManager::new();
        let mut load = LoadContext::new(bytes.as_slice(), 1..=1).unwrap();
        restored.load(&mut load).unwrap();

        let chunk = restored.find_chunk(id).unwrap();
        assert_eq!(chunk.job(), None);
        assert_eq!(chunk.ref_counter().ref_counter(), 1);
    }
}
