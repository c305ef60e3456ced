/*!
 * Master automaton
 *
 * All replicated master state in one place: the object manager with its
 * zombie queue, the object tables its handlers route to, and the job
 * tracker. Only the automaton task touches it; mutations arrive through
 * [`MasterAutomaton::apply_mutation`].
 *
 * ```text
 * ObjectManager ──ref/unref/destroy──► Handlers ─┬─► simple objects
 *                                                ├─► ChunkManager
 *                                                └─► data centers ──► JobTracker edges
 * ```
 */

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info};

use cellmaster_chunk_server::{
    ChunkManager, DataCenterId, JobContext, JobTracker, NodeId, NodeTracker,
};
use cellmaster_core_object::{
    MasterObject, ObjectId, ObjectTable, ObjectType, ReferenceCounter,
};
use cellmaster_hydra::{HydraStatus, LoadContext, SaveContext};
use cellmaster_object_server::{
    DestroyObjectsRequest, GarbageCollector, GcMetrics, HandlerRegistry, ObjectManager,
    TypeHandler,
};
use cellmaster_observability::SensorBuffer;

use crate::config::{DynamicClusterConfig, MasterConfig};
use crate::error::{MasterError, Result};
use crate::mutation::MasterMutation;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const MIN_SNAPSHOT_VERSION: u32 = 1;

/// An object with no state beyond its reference counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleObject {
    id: ObjectId,
    refs: ReferenceCounter,
}

impl MasterObject for SimpleObject {
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

struct DataCenterHandler<'a> {
    node_tracker: &'a mut NodeTracker,
    job_tracker: &'a mut JobTracker,
}

impl TypeHandler for DataCenterHandler<'_> {
    fn find_ref_counter(&self, id: ObjectId) -> Option<&ReferenceCounter> {
        self.node_tracker
            .find_data_center(id)
            .map(|data_center| data_center.ref_counter())
    }

    fn find_ref_counter_mut(&mut self, id: ObjectId) -> Option<&mut ReferenceCounter> {
        self.node_tracker
            .find_data_center_mut(id)
            .map(|data_center| data_center.ref_counter_mut())
    }

    fn destroy_object(&mut self, id: ObjectId) -> bool {
        self.job_tracker
            .destroy_data_center(id, self.node_tracker)
            .is_some()
    }
}

struct Handlers<'a> {
    simple_objects: &'a mut ObjectTable<SimpleObject>,
    chunks: &'a mut ChunkManager,
    data_centers: DataCenterHandler<'a>,
}

fn has_simple_handler(object_type: ObjectType) -> bool {
    matches!(
        object_type,
        ObjectType::Transaction
            | ObjectType::ChunkList
            | ObjectType::StringNode
            | ObjectType::MapNode
            | ObjectType::Account
    )
}

impl HandlerRegistry for Handlers<'_> {
    fn handler(&self, object_type: ObjectType) -> Option<&dyn TypeHandler> {
        match object_type {
            ty if ty.is_chunk() => Some(&*self.chunks),
            ObjectType::DataCenter => Some(&self.data_centers),
            ty if has_simple_handler(ty) => Some(&*self.simple_objects),
            _ => None,
        }
    }

    fn handler_mut(&mut self, object_type: ObjectType) -> Option<&mut dyn TypeHandler> {
        match object_type {
            ty if ty.is_chunk() => Some(&mut *self.chunks),
            ObjectType::DataCenter => Some(&mut self.data_centers),
            ty if has_simple_handler(ty) => Some(&mut *self.simple_objects),
            _ => None,
        }
    }
}

/// What a snapshot holds, for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub simple_objects: usize,
    pub chunks: usize,
    pub data_centers: Vec<String>,
    pub zombies: Vec<String>,
}

pub struct MasterAutomaton {
    object_manager: ObjectManager,
    simple_objects: ObjectTable<SimpleObject>,
    chunk_manager: ChunkManager,
    node_tracker: NodeTracker,
    job_tracker: JobTracker,
}

impl MasterAutomaton {
    pub fn new(
        config: &MasterConfig,
        status: Arc<dyn HydraStatus>,
        metrics: GcMetrics,
    ) -> Result<Self> {
        config.validate()?;

        let cell_tag = config.cell.cell_tag();
        let object_manager = ObjectManager::new(cell_tag, status, metrics, &config.object_manager);
        let mut job_tracker = JobTracker::new(
            cell_tag,
            config.cell.secondary_cell_count(),
            Arc::new(config.chunk_manager.clone()),
        )?;

        let node_tracker = NodeTracker::new();
        job_tracker.init_inter_dc_edges(&node_tracker);

        Ok(Self {
            object_manager,
            simple_objects: ObjectTable::new(),
            chunk_manager: ChunkManager::new(),
            node_tracker,
            job_tracker,
        })
    }

    pub fn object_manager(&self) -> &ObjectManager {
        &self.object_manager
    }

    pub fn gc(&self) -> &GarbageCollector {
        self.object_manager.gc()
    }

    pub fn chunk_manager(&self) -> &ChunkManager {
        &self.chunk_manager
    }

    pub fn chunk_manager_mut(&mut self) -> &mut ChunkManager {
        &mut self.chunk_manager
    }

    pub fn node_tracker(&self) -> &NodeTracker {
        &self.node_tracker
    }

    pub fn node_tracker_mut(&mut self) -> &mut NodeTracker {
        &mut self.node_tracker
    }

    pub fn job_tracker(&self) -> &JobTracker {
        &self.job_tracker
    }

    pub fn find_simple_object(&self, id: ObjectId) -> Option<&SimpleObject> {
        self.simple_objects.find(id)
    }

    pub fn simple_object_count(&self) -> usize {
        self.simple_objects.len()
    }

    /// The job tracker and the state its operations work on
    pub fn job_context(&mut self) -> (&mut JobTracker, JobContext<'_>) {
        (
            &mut self.job_tracker,
            JobContext {
                node_tracker: &mut self.node_tracker,
                chunk_manager: &mut self.chunk_manager,
            },
        )
    }

    fn handlers(&mut self) -> (&mut ObjectManager, Handlers<'_>) {
        (
            &mut self.object_manager,
            Handlers {
                simple_objects: &mut self.simple_objects,
                chunks: &mut self.chunk_manager,
                data_centers: DataCenterHandler {
                    node_tracker: &mut self.node_tracker,
                    job_tracker: &mut self.job_tracker,
                },
            },
        )
    }

    /// Create an object holding one creation reference
    pub fn create_object(&mut self, object_type: ObjectType) -> Result<ObjectId> {
        if !object_type.is_chunk() && !has_simple_handler(object_type) {
            return Err(MasterError::UnsupportedObjectType(object_type));
        }

        let id = self.object_manager.generate_id(object_type);
        if object_type.is_chunk() {
            self.chunk_manager.create_chunk(id);
        } else {
            let mut refs = ReferenceCounter::new();
            refs.ref_object();
            self.simple_objects.insert(SimpleObject { id, refs });
        }

        debug!(object_id = %id, object_type = %object_type, "Object created");
        Ok(id)
    }

    pub fn ref_object(&mut self, id: ObjectId) -> Result<i32> {
        let (object_manager, mut handlers) = self.handlers();
        Ok(object_manager.ref_object(id, &mut handlers)?)
    }

    pub fn unref_object(&mut self, id: ObjectId) -> Result<i32> {
        let (object_manager, mut handlers) = self.handlers();
        Ok(object_manager.unref_object(id, &mut handlers)?)
    }

    pub fn object_ref_counter(&mut self, id: ObjectId) -> Result<i32> {
        let (object_manager, handlers) = self.handlers();
        Ok(object_manager.object_ref_counter(id, &handlers)?)
    }

    pub fn destroy_objects(&mut self, request: &DestroyObjectsRequest) -> usize {
        let (object_manager, mut handlers) = self.handlers();
        object_manager.destroy_objects(request, &mut handlers)
    }

    pub fn create_data_center(&mut self, name: &str) -> Result<DataCenterId> {
        let id = self.object_manager.generate_id(ObjectType::DataCenter);
        self.node_tracker.create_data_center(id, name)?;
        self.job_tracker.on_data_center_created(id, &self.node_tracker);
        Ok(id)
    }

    /// Drop the creation reference of the data center called `name`
    pub fn remove_data_center(&mut self, name: &str) -> Result<()> {
        let id = self.node_tracker.get_data_center_by_name(name)?;
        self.unref_object(id)?;
        Ok(())
    }

    /// Place the node at `address` into the named data center, or none
    pub fn set_node_data_center(
        &mut self,
        address: &str,
        data_center: Option<&str>,
    ) -> Result<NodeId> {
        let data_center = data_center
            .map(|name| self.node_tracker.get_data_center_by_name(name))
            .transpose()?;

        let node_id = self.node_tracker.register_node(address);
        let old = self
            .node_tracker
            .set_node_data_center(node_id, data_center)?;
        if old != data_center {
            self.job_tracker
                .on_node_data_center_changed(node_id, old, &self.node_tracker)?;
        }
        Ok(node_id)
    }

    pub fn apply_mutation(&mut self, mutation: &MasterMutation) -> Result<()> {
        match mutation {
            MasterMutation::CreateObject { object_type } => {
                self.create_object(*object_type)?;
            }
            MasterMutation::RefObject { object_id } => {
                self.ref_object(*object_id)?;
            }
            MasterMutation::UnrefObject { object_id } => {
                self.unref_object(*object_id)?;
            }
            MasterMutation::CreateDataCenter { name } => {
                self.create_data_center(name)?;
            }
            MasterMutation::RemoveDataCenter { name } => {
                self.remove_data_center(name)?;
            }
            MasterMutation::SetNodeDataCenter {
                address,
                data_center,
            } => {
                self.set_node_data_center(address, data_center.as_deref())?;
            }
            MasterMutation::DestroyObjects(request) => {
                self.destroy_objects(request);
            }
        }
        Ok(())
    }

    pub fn on_config_changed(&mut self, config: &DynamicClusterConfig) -> Result<()> {
        self.object_manager.on_config_changed(&config.object_manager);
        self.job_tracker
            .on_dynamic_config_changed(Arc::new(config.chunk_manager.clone()))?;
        info!("Dynamic config applied");
        Ok(())
    }

    pub fn on_profiling(&self, buffer: &mut dyn SensorBuffer) {
        self.job_tracker.on_profiling(buffer, &self.node_tracker);
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<W> {
        let mut context = SaveContext::new(writer, SNAPSHOT_VERSION)?;
        self.object_manager.save(&mut context)?;
        context.save(&self.simple_objects)?;
        self.chunk_manager.save(&mut context)?;
        self.node_tracker.save(&mut context)?;
        Ok(context.finish()?)
    }

    /// Replace all state with a snapshot
    ///
    /// Jobs and nodes are not persisted; nodes re-register and jobs are
    /// rescheduled after a restart.
    ///
    /// Nothing changes unless the whole snapshot decodes.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut context = LoadContext::new(reader, MIN_SNAPSHOT_VERSION..=SNAPSHOT_VERSION)?;
        let objects = ObjectManager::read_snapshot(&mut context)?;
        let simple_objects: ObjectTable<SimpleObject> = context.load()?;
        let mut chunk_manager = ChunkManager::new();
        chunk_manager.load(&mut context)?;
        let mut node_tracker = NodeTracker::new();
        node_tracker.load(&mut context)?;

        self.clear();
        self.object_manager.restore(objects);
        self.simple_objects = simple_objects;
        self.chunk_manager = chunk_manager;
        self.node_tracker = node_tracker;
        self.job_tracker.init_inter_dc_edges(&self.node_tracker);

        info!(
            version = context.version(),
            zombies = self.gc().zombie_count(),
            chunks = self.chunk_manager.chunk_count(),
            data_centers = self.node_tracker.data_center_count(),
            "Snapshot loaded"
        );
        Ok(())
    }

    pub fn summary(&self) -> SnapshotSummary {
        let mut data_centers: Vec<String> = self
            .node_tracker
            .data_centers()
            .map(|data_center| data_center.name().to_string())
            .collect();
        data_centers.sort();

        SnapshotSummary {
            simple_objects: self.simple_objects.len(),
            chunks: self.chunk_manager.chunk_count(),
            data_centers,
            zombies: self.gc().zombies().map(|id| id.to_string()).collect(),
        }
    }

    pub fn clear(&mut self) {
        self.object_manager.clear();
        self.simple_objects.clear();
        self.chunk_manager.clear();
        self.node_tracker.clear();
        self.job_tracker.clear();
    }
}
