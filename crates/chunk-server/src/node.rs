//! Node and data center registry
//!
//! Nodes are transient: they register on their first heartbeat and are not
//! persisted. Data centers are replicated master objects living in an
//! [`ObjectTable`] and are saved with the snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Write};
use tracing::{debug, info};

use cellmaster_core_object::{MasterObject, ObjectId, ObjectTable, ReferenceCounter};
use cellmaster_hydra::{LoadContext, SaveContext};

use crate::error::{ChunkServerError, Result};
use crate::job::{ChunkIdWithIndexes, Job, NodeResourceLimitsOverrides};

pub type NodeId = u32;

pub type DataCenterId = ObjectId;

/// Read access to data center topology, as needed by flow accounting
pub trait DataCenterDirectory {
    /// Data centers that are alive, in id order
    fn alive_data_centers(&self) -> Vec<DataCenterId>;

    /// Every known data center including ones awaiting destruction
    fn all_data_centers(&self) -> Vec<DataCenterId>;

    fn data_center_name(&self, id: DataCenterId) -> Option<&str>;

    /// Data center a node currently belongs to; unknown nodes have none
    fn node_data_center(&self, node_id: NodeId) -> Option<DataCenterId>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCenter {
    id: DataCenterId,
    name: String,
    refs: ReferenceCounter,
}

impl DataCenter {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MasterObject for DataCenter {
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

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    default_address: String,
    data_center: Option<DataCenterId>,
    id_to_job: BTreeMap<ObjectId, Job>,
    resource_limits_overrides: NodeResourceLimitsOverrides,
    chunk_removal_queue: BTreeSet<ChunkIdWithIndexes>,
}

impl Node {
    fn new(id: NodeId, default_address: String, data_center: Option<DataCenterId>) -> Self {
        Self {
            id,
            default_address,
            data_center,
            id_to_job: BTreeMap::new(),
            resource_limits_overrides: NodeResourceLimitsOverrides::default(),
            chunk_removal_queue: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn default_address(&self) -> &str {
        &self.default_address
    }

    pub fn data_center(&self) -> Option<DataCenterId> {
        self.data_center
    }

    /// Jobs the master believes are running on this node
    pub fn id_to_job(&self) -> &BTreeMap<ObjectId, Job> {
        &self.id_to_job
    }

    pub fn find_job(&self, job_id: ObjectId) -> Option<&Job> {
        self.id_to_job.get(&job_id)
    }

    pub fn find_job_mut(&mut self, job_id: ObjectId) -> Option<&mut Job> {
        self.id_to_job.get_mut(&job_id)
    }

    /// # Panics
    ///
    /// Panics if the job is already registered or belongs to another node.
    pub fn register_job(&mut self, job: Job) {
        assert_eq!(
            job.node_id(),
            self.id,
            "Job {} registered at foreign node",
            job.job_id()
        );
        let job_id = job.job_id();
        let previous = self.id_to_job.insert(job_id, job);
        assert!(
            previous.is_none(),
            "Job {} is already registered at node {}",
            job_id,
            self.id
        );
    }

    /// # Panics
    ///
    /// Panics if the job is not registered here.
    pub fn unregister_job(&mut self, job_id: ObjectId) -> Job {
        match self.id_to_job.remove(&job_id) {
            Some(job) => job,
            None => panic!("Job {} is not registered at node {}", job_id, self.id),
        }
    }

    pub fn resource_limits_overrides(&self) -> &NodeResourceLimitsOverrides {
        &self.resource_limits_overrides
    }

    pub fn set_resource_limits_overrides(&mut self, overrides: NodeResourceLimitsOverrides) {
        self.resource_limits_overrides = overrides;
    }

    pub fn add_to_chunk_removal_queue(&mut self, replica: ChunkIdWithIndexes) {
        self.chunk_removal_queue.insert(replica);
    }

    pub fn chunk_removal_queue(&self) -> &BTreeSet<ChunkIdWithIndexes> {
        &self.chunk_removal_queue
    }

    pub fn take_chunk_removal_queue(&mut self) -> BTreeSet<ChunkIdWithIndexes> {
        std::mem::take(&mut self.chunk_removal_queue)
    }
}

#[derive(Debug, Default)]
pub struct NodeTracker {
    nodes: BTreeMap<NodeId, Node>,
    address_to_node: HashMap<String, NodeId>,
    next_node_id: NodeId,
    data_centers: ObjectTable<DataCenter>,
    name_to_data_center: HashMap<String, DataCenterId>,
}

impl NodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, or return the existing one for a known address
    pub fn register_node(&mut self, address: &str) -> NodeId {
        if let Some(&id) = self.address_to_node.get(address) {
            return id;
        }

        self.next_node_id += 1;
        let id = self.next_node_id;
        self.nodes
            .insert(id, Node::new(id, address.to_string(), None));
        self.address_to_node.insert(address.to_string(), id);
        info!(node_id = id, address, "Node registered");
        id
    }

    /// Drop a node along with whatever jobs the master still had for it
    pub fn unregister_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;
        self.address_to_node.remove(node.default_address());
        info!(node_id, address = node.default_address(), "Node unregistered");
        Some(node)
    }

    pub fn find_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn find_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn find_node_by_address(&self, address: &str) -> Option<&Node> {
        self.address_to_node
            .get(address)
            .and_then(|id| self.nodes.get(id))
    }

    pub fn get_node(&self, node_id: NodeId) -> Result<&Node> {
        self.find_node(node_id)
            .ok_or(ChunkServerError::NoSuchNode(node_id))
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Result<&mut Node> {
        self.find_node_mut(node_id)
            .ok_or(ChunkServerError::NoSuchNode(node_id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Move a node to another data center; returns the previous one
    pub fn set_node_data_center(
        &mut self,
        node_id: NodeId,
        data_center: Option<DataCenterId>,
    ) -> Result<Option<DataCenterId>> {
        if let Some(id) = data_center {
            if !self.data_centers.contains(id) {
                return Err(ChunkServerError::NoSuchDataCenter(id));
            }
        }

        let node = self.get_node_mut(node_id)?;
        let old = std::mem::replace(&mut node.data_center, data_center);
        debug!(node_id, ?old, new = ?data_center, "Node data center changed");
        Ok(old)
    }

    /// Create a data center holding its creation reference
    pub fn create_data_center(&mut self, id: DataCenterId, name: &str) -> Result<&DataCenter> {
        if name.is_empty() {
            return Err(ChunkServerError::InvalidDataCenterName(name.to_string()));
        }
        if self.name_to_data_center.contains_key(name) {
            return Err(ChunkServerError::DuplicateDataCenter(name.to_string()));
        }

        let mut refs = ReferenceCounter::new();
        refs.ref_object();
        self.name_to_data_center.insert(name.to_string(), id);
        info!(data_center_id = %id, name, "Data center created");

        Ok(self.data_centers.insert(DataCenter {
            id,
            name: name.to_string(),
            refs,
        }))
    }

    /// Remove a data center; nodes in it fall back to the null data center
    pub fn destroy_data_center(&mut self, id: DataCenterId) -> Option<DataCenter> {
        let data_center = self.data_centers.remove(id)?;
        self.name_to_data_center.remove(data_center.name());

        for node in self.nodes.values_mut() {
            if node.data_center == Some(id) {
                node.data_center = None;
            }
        }

        info!(data_center_id = %id, name = data_center.name(), "Data center destroyed");
        Some(data_center)
    }

    pub fn find_data_center(&self, id: DataCenterId) -> Option<&DataCenter> {
        self.data_centers.find(id)
    }

    pub fn find_data_center_mut(&mut self, id: DataCenterId) -> Option<&mut DataCenter> {
        self.data_centers.find_mut(id)
    }

    pub fn find_data_center_by_name(&self, name: &str) -> Option<&DataCenter> {
        self.name_to_data_center
            .get(name)
            .and_then(|id| self.data_centers.find(*id))
    }

    pub fn data_centers(&self) -> impl Iterator<Item = &DataCenter> {
        self.data_centers.iter().map(|(_, data_center)| data_center)
    }

    /// Id of the data center called `name`
    pub fn get_data_center_by_name(&self, name: &str) -> Result<DataCenterId> {
        self.name_to_data_center
            .get(name)
            .copied()
            .ok_or_else(|| ChunkServerError::UnknownDataCenter(name.to_string()))
    }

    pub fn data_center_count(&self) -> usize {
        self.data_centers.len()
    }

    pub fn save<W: Write>(&self, context: &mut SaveContext<W>) -> cellmaster_hydra::Result<()> {
        context.save(&self.data_centers)
    }

    /// Restore data centers; nodes re-register on their next heartbeat
    pub fn load<R: Read>(&mut self, context: &mut LoadContext<R>) -> cellmaster_hydra::Result<()> {
        self.clear();
        self.data_centers = context.load()?;
        self.name_to_data_center = self
            .data_centers
            .iter()
            .map(|(id, data_center)| (data_center.name().to_string(), *id))
            .collect();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.address_to_node.clear();
        self.next_node_id = 0;
        self.data_centers.clear();
        self.name_to_data_center.clear();
    }
}

impl DataCenterDirectory for NodeTracker {
    fn alive_data_centers(&self) -> Vec<DataCenterId> {
        self.data_centers.alive().map(|dc| dc.id()).collect()
    }

    fn all_data_centers(&self) -> Vec<DataCenterId> {
        self.data_centers.ids().collect()
    }

    fn data_center_name(&self, id: DataCenterId) -> Option<&str> {
        self.data_centers.find(id).map(|dc| dc.name())
    }

    fn node_data_center(&self, node_id: NodeId) -> Option<DataCenterId> {
        self.nodes.get(&node_id).and_then(|node| node.data_center)
    }
}
