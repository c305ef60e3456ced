//! Object manager
//!
//! Owns id generation and the garbage collector, and routes reference
//! counting to the handler for each object's type. Everything here runs on
//! the automaton.

use cellmaster_core_object::{
    type_from_id, CellTag, IdGenerator, ObjectError, ObjectId, ObjectType, ReferenceCounter,
    Result,
};
use cellmaster_hydra::{HydraStatus, LoadContext, SaveContext};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ObjectManagerConfig;
use crate::gc::{DestroyObjectsRequest, GarbageCollector};
use crate::handler::HandlerRegistry;
use crate::metrics::GcMetrics;

pub struct ObjectManager {
    id_generator: IdGenerator,
    gc: GarbageCollector,
}

/// Object manager state decoded from a snapshot, not yet applied
#[derive(Debug)]
pub struct ObjectManagerSnapshot {
    id_generator: IdGenerator,
    zombies: BTreeSet<ObjectId>,
}

fn find_ref_counter_mut(
    handlers: &mut dyn HandlerRegistry,
    id: ObjectId,
) -> Result<&mut ReferenceCounter> {
    handlers
        .handler_mut(type_from_id(id))
        .ok_or(ObjectError::NoHandler(id))?
        .find_ref_counter_mut(id)
        .ok_or(ObjectError::NoSuchObject(id))
}

impl ObjectManager {
    pub fn new(
        cell_tag: CellTag,
        status: Arc<dyn HydraStatus>,
        metrics: GcMetrics,
        config: &ObjectManagerConfig,
    ) -> Self {
        Self {
            id_generator: IdGenerator::new(cell_tag),
            gc: GarbageCollector::new(status, metrics, config.max_objects_per_gc_sweep),
        }
    }

    pub fn gc(&self) -> &GarbageCollector {
        &self.gc
    }

    pub fn gc_mut(&mut self) -> &mut GarbageCollector {
        &mut self.gc
    }

    pub fn cell_tag(&self) -> CellTag {
        self.id_generator.cell_tag()
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.id_generator
    }

    /// Next replicated id for `object_type`
    pub fn generate_id(&mut self, object_type: ObjectType) -> ObjectId {
        self.id_generator.next(object_type)
    }

    pub fn on_config_changed(&mut self, config: &ObjectManagerConfig) {
        self.gc
            .set_max_objects_per_sweep(config.max_objects_per_gc_sweep);
    }

    /// Take a strong reference; returns the new count
    ///
    /// # Panics
    ///
    /// Panics if the object is a zombie; nothing may resurrect it.
    pub fn ref_object(&mut self, id: ObjectId, handlers: &mut dyn HandlerRegistry) -> Result<i32> {
        assert!(
            !self.gc.is_zombie(id),
            "Cannot reference zombie object {}",
            id
        );

        let count = find_ref_counter_mut(handlers, id)?.ref_object();
        debug!(object_id = %id, ref_counter = count, "Object referenced");
        Ok(count)
    }

    /// Drop a strong reference, queueing the object for GC at zero
    pub fn unref_object(
        &mut self,
        id: ObjectId,
        handlers: &mut dyn HandlerRegistry,
    ) -> Result<i32> {
        let count = find_ref_counter_mut(handlers, id)?.unref_object();
        debug!(object_id = %id, ref_counter = count, "Object unreferenced");

        if count == 0 {
            self.gc.enqueue(id);
        }
        Ok(count)
    }

    pub fn object_ref_counter(&self, id: ObjectId, handlers: &dyn HandlerRegistry) -> Result<i32> {
        handlers
            .handler(type_from_id(id))
            .ok_or(ObjectError::NoHandler(id))?
            .find_ref_counter(id)
            .map(|counter| counter.ref_counter())
            .ok_or(ObjectError::NoSuchObject(id))
    }

    /// Apply a committed destroy-objects mutation
    ///
    /// Ids that are no longer zombies were destroyed by an earlier commit of
    /// the same batch and are skipped. Returns the number destroyed.
    pub fn destroy_objects(
        &mut self,
        request: &DestroyObjectsRequest,
        handlers: &mut dyn HandlerRegistry,
    ) -> usize {
        let mut destroyed = 0;

        for &id in &request.object_ids {
            if !self.gc.is_zombie(id) {
                debug!(object_id = %id, "Object is already destroyed, skipped");
                continue;
            }

            match handlers.handler_mut(type_from_id(id)) {
                Some(handler) => {
                    if !handler.destroy_object(id) {
                        warn!(object_id = %id, "Zombie object was missing from its table");
                    }
                }
                None => warn!(object_id = %id, "No type handler for zombie object"),
            }

            self.gc.dequeue(id);
            destroyed += 1;
        }

        debug!(
            requested = request.object_ids.len(),
            destroyed,
            "Objects destroyed"
        );
        destroyed
    }

    pub fn save<W: Write>(&self, context: &mut SaveContext<W>) -> cellmaster_hydra::Result<()> {
        context.save(&self.id_generator)?;
        self.gc.save(context)
    }

    pub fn load<R: Read>(&mut self, context: &mut LoadContext<R>) -> cellmaster_hydra::Result<()> {
        let snapshot = Self::read_snapshot(context)?;
        self.restore(snapshot);
        Ok(())
    }

    /// Decode the state written by [`save`](Self::save) without touching `self`
    pub fn read_snapshot<R: Read>(
        context: &mut LoadContext<R>,
    ) -> cellmaster_hydra::Result<ObjectManagerSnapshot> {
        Ok(ObjectManagerSnapshot {
            id_generator: context.load()?,
            zombies: context.load()?,
        })
    }

    pub fn restore(&mut self, snapshot: ObjectManagerSnapshot) {
        self.id_generator = snapshot.id_generator;
        self.gc.restore(snapshot.zombies);
    }

    pub fn clear(&mut self) {
        self.id_generator.reset();
        self.gc.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::{MasterObject, ObjectTable};
    use cellmaster_hydra::PeerStatus;
    use futures::FutureExt;

    use crate::handler::TypeHandler;

    #[derive(Debug, Clone)]
    struct Node {
        id: ObjectId,
        refs: ReferenceCounter,
    }

    impl MasterObject for Node {
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

    #[derive(Default)]
    struct Handlers {
        nodes: ObjectTable<Node>,
    }

    impl HandlerRegistry for Handlers {
        fn handler(&self, object_type: ObjectType) -> Option<&dyn TypeHandler> {
            match object_type {
                ObjectType::MapNode => Some(&self.nodes),
                _ => None,
            }
        }

        fn handler_mut(&mut self, object_type: ObjectType) -> Option<&mut dyn TypeHandler> {
            match object_type {
                ObjectType::MapNode => Some(&mut self.nodes),
                _ => None,
            }
        }
    }

    fn setup() -> (ObjectManager, Handlers) {
        let manager = ObjectManager::new(
            CellTag(1),
            Arc::new(PeerStatus::leader()),
            GcMetrics::new(),
            &ObjectManagerConfig::default(),
        );
        (manager, Handlers::default())
    }

    fn create_node(manager: &mut ObjectManager, handlers: &mut Handlers) -> ObjectId {
        let id = manager.generate_id(ObjectType::MapNode);
        handlers.nodes.insert(Node {
            id,
            refs: ReferenceCounter::new(),
        });
        manager.ref_object(id, handlers).unwrap();
        id
    }

    #[test]
    fn test_unref_to_zero_enqueues() {
        let (mut manager, mut handlers) = setup();
        let id = create_node(&mut manager, &mut handlers);

        assert_eq!(manager.ref_object(id, &mut handlers).unwrap(), 2);
        assert_eq!(manager.unref_object(id, &mut handlers).unwrap(), 1);
        assert!(!manager.gc().is_zombie(id));

        assert_eq!(manager.unref_object(id, &mut handlers).unwrap(), 0);
        assert!(manager.gc().is_zombie(id));
        assert_eq!(manager.object_ref_counter(id, &handlers).unwrap(), 0);
    }

    #[test]
    fn test_destroy_objects_removes_and_dequeues() {
        let (mut manager, mut handlers) = setup();
        let a = create_node(&mut manager, &mut handlers);
        let b = create_node(&mut manager, &mut handlers);
        manager.unref_object(a, &mut handlers).unwrap();
        manager.unref_object(b, &mut handlers).unwrap();

        let request = manager.gc().prepare_sweep().unwrap();
        assert_eq!(manager.destroy_objects(&request, &mut handlers), 2);

        assert!(handlers.nodes.is_empty());
        assert_eq!(manager.gc().zombie_count(), 0);
        assert!(manager.gc().collect().now_or_never().is_some());
    }

    #[test]
    fn test_replayed_destroy_is_harmless() {
        let (mut manager, mut handlers) = setup();
        let id = create_node(&mut manager, &mut handlers);
        manager.unref_object(id, &mut handlers).unwrap();

        let request = manager.gc().prepare_sweep().unwrap();
        assert_eq!(manager.destroy_objects(&request, &mut handlers), 1);
        assert_eq!(manager.destroy_objects(&request, &mut handlers), 0);
    }

    #[test]
    fn test_unknown_objects_are_errors() {
        let (mut manager, mut handlers) = setup();

        let missing = ObjectId::make(ObjectType::MapNode, CellTag(1), 99, 0);
        assert_eq!(
            manager.ref_object(missing, &mut handlers),
            Err(ObjectError::NoSuchObject(missing))
        );

        let unhandled = ObjectId::make(ObjectType::Account, CellTag(1), 1, 0);
        assert_eq!(
            manager.unref_object(unhandled, &mut handlers),
            Err(ObjectError::NoHandler(unhandled))
        );
    }

    #[test]
    #[should_panic(expected = "Cannot reference zombie object")]
    fn test_ref_zombie_panics() {
        let (mut manager, mut handlers) = setup();
        let id = create_node(&mut manager, &mut handlers);
        manager.unref_object(id, &mut handlers).unwrap();
        let _ = manager.ref_object(id, &mut handlers);
    }

    #[test]
    fn test_snapshot_preserves_generator_and_queue() {
        let (mut manager, mut handlers) = setup();
        let id = create_node(&mut manager, &mut handlers);
        manager.unref_object(id, &mut handlers).unwrap();

        let mut save = SaveContext::new(Vec::new(), 1).unwrap();
        manager.save(&mut save).unwrap();
        let bytes = save.finish().unwrap();

        let (mut restored, _) = setup();
        let mut load = LoadContext::new(bytes.as_slice(), 1..=1).unwrap();
        restored.load(&mut load).unwrap();

        assert!(restored.gc().is_zombie(id));
        assert_eq!(
            restored.generate_id(ObjectType::MapNode),
            manager.generate_id(ObjectType::MapNode)
        );

        restored.clear();
        assert_eq!(restored.gc().zombie_count(), 0);
        assert_eq!(restored.id_generator().counter(ObjectType::MapNode), 0);
    }
}
