//! Job tracker
//!
//! The master's authoritative view of jobs in flight on storage nodes. Jobs
//! are registered when the replicator dispatches them and reconciled against
//! each node's report on every heartbeat. Registration is gated by the
//! dispatch throttler and charged against inter-DC edges.
//!
//! Everything except [`JobTracker::is_overdraft`] runs on the automaton.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use cellmaster_core_object::{make_random_id, CellTag, ObjectId, ObjectType};
use cellmaster_core_resilience::JobThrottler;
use cellmaster_observability::SensorBuffer;

use crate::chunk::ChunkManager;
use crate::config::DynamicChunkManagerConfig;
use crate::edge_table::{DataCenterEdgeTable, EdgeEnd, EdgeMatrix};
use crate::error::Result;
use crate::job::{Job, JobErrorCode, JobState, JobType, NodeResources};
use crate::node::{DataCenter, DataCenterDirectory, DataCenterId, Node, NodeId, NodeTracker};

/// Automaton state a job operation touches
pub struct JobContext<'a> {
    pub node_tracker: &'a mut NodeTracker,
    pub chunk_manager: &'a mut ChunkManager,
}

/// Per job type bookkeeping; all but `running` only grow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTypeCounters {
    pub running: i64,
    pub started: i64,
    pub completed: i64,
    pub failed: i64,
    pub aborted: i64,
}

pub struct JobTracker {
    cell_tag: CellTag,
    config: Arc<DynamicChunkManagerConfig>,
    throttler: JobThrottler,
    edges: DataCenterEdgeTable,
    counters: HashMap<JobType, JobTypeCounters>,
}

fn edge_end_name(directory: &dyn DataCenterDirectory, end: EdgeEnd) -> String {
    match end {
        None => "null".to_string(),
        Some(id) => directory
            .data_center_name(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string()),
    }
}

fn profile_edges(
    buffer: &mut dyn SensorBuffer,
    directory: &dyn DataCenterDirectory,
    matrix: &EdgeMatrix,
    path: &str,
) {
    for (source, row) in matrix {
        buffer.push_tag("source_data_center", &edge_end_name(directory, *source));
        for (destination, value) in row {
            buffer.push_tag(
                "destination_data_center",
                &edge_end_name(directory, *destination),
            );
            buffer.add_gauge(path, *value as f64);
            buffer.pop_tag();
        }
        buffer.pop_tag();
    }
}

impl JobTracker {
    pub fn new(
        cell_tag: CellTag,
        secondary_cell_count: usize,
        config: Arc<DynamicChunkManagerConfig>,
    ) -> Result<Self> {
        let throttler = JobThrottler::new(&config.job_throttler)?;
        let edges = DataCenterEdgeTable::new(config.inter_dc_limits.clone(), secondary_cell_count);
        Ok(Self {
            cell_tag,
            config,
            throttler,
            edges,
            counters: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DynamicChunkManagerConfig {
        &self.config
    }

    pub fn edges(&self) -> &DataCenterEdgeTable {
        &self.edges
    }

    /// Load edge capacities and saturation for the current topology
    pub fn init_inter_dc_edges(&mut self, directory: &dyn DataCenterDirectory) {
        self.edges.init(directory, Instant::now());
    }

    pub fn on_dynamic_config_changed(&mut self, config: Arc<DynamicChunkManagerConfig>) -> Result<()> {
        self.throttler.reconfigure(&config.job_throttler)?;
        self.edges.set_limits(config.inter_dc_limits.clone());
        self.config = config;
        Ok(())
    }

    /// Fresh id for a job dispatched by this cell
    pub fn generate_job_id(&self) -> ObjectId {
        make_random_id(ObjectType::MasterJob, self.cell_tag)
    }

    /// Whether dispatch has outrun the throttler; callable from any thread
    pub fn is_overdraft(&self) -> bool {
        self.throttler.is_overdraft()
    }

    pub fn counters(&self, job_type: JobType) -> JobTypeCounters {
        self.counters.get(&job_type).copied().unwrap_or_default()
    }

    pub fn has_unsaturated_inter_dc_edge_starting_from(&self, source: EdgeEnd) -> bool {
        self.edges.is_unsaturated(source)
    }

    pub fn unsaturated_inter_dc_edges_starting_from(
        &self,
        source: EdgeEnd,
    ) -> impl Iterator<Item = EdgeEnd> + '_ {
        self.edges.unsaturated_from(source)
    }

    /// Tighten a node's advertised limits with its administrative overrides
    pub fn override_resource_limits(&self, limits: &mut NodeResources, node: &Node) {
        node.resource_limits_overrides().apply(limits);
    }

    /// Start tracking a newly dispatched job; `None` is ignored
    pub fn register_job(
        &mut self,
        job: Option<Job>,
        jobs_to_start: &mut Vec<Job>,
        resource_usage: &mut NodeResources,
        context: &mut JobContext<'_>,
    ) -> Result<()> {
        let Some(job) = job else {
            return Ok(());
        };

        let node = context.node_tracker.get_node_mut(job.node_id())?;
        let source = node.data_center();

        *resource_usage += job.resource_usage();
        jobs_to_start.push(job.clone());
        node.register_job(job.clone());

        let counters = self.counters.entry(job.job_type()).or_default();
        counters.running += 1;
        counters.started += 1;

        // The chunk may already be gone
        if let Some(chunk) = context.chunk_manager.find_chunk_mut(job.chunk_id()) {
            chunk.set_job(Some(job.job_id()));
        }

        self.edges
            .record_flow(&job, source, 1, &*context.node_tracker);
        self.throttler.acquire(1);

        debug!(
            job_id = %job.job_id(),
            job_type = %job.job_type(),
            node_id = job.node_id(),
            chunk = %job.chunk_id_with_indexes(),
            "Job registered"
        );
        Ok(())
    }

    /// Stop tracking a job, counting it by its current state
    pub fn unregister_job(&mut self, job: &Job, context: &mut JobContext<'_>) -> Result<()> {
        let node = context.node_tracker.get_node_mut(job.node_id())?;
        let source = node.data_center();
        node.unregister_job(job.job_id());

        let counters = self.counters.entry(job.job_type()).or_default();
        counters.running -= 1;
        match job.state() {
            JobState::Completed => counters.completed += 1,
            JobState::Failed => counters.failed += 1,
            JobState::Aborted => counters.aborted += 1,
            JobState::Waiting | JobState::Running => {}
        }

        let chunk_id = job.chunk_id();
        if let Some(chunk) = context.chunk_manager.find_chunk_mut(chunk_id) {
            chunk.set_job(None);
            context.chunk_manager.schedule_chunk_refresh(chunk_id);
        }

        self.edges
            .record_flow(job, source, -1, &*context.node_tracker);

        debug!(
            job_id = %job.job_id(),
            job_type = %job.job_type(),
            node_id = job.node_id(),
            state = %job.state(),
            "Job unregistered"
        );
        Ok(())
    }

    /// Reconcile a node's reported jobs with what the master recorded
    ///
    /// Reported jobs must already be registered at `node_id`. Timed out jobs
    /// go to `jobs_to_abort` and stay registered until the node confirms.
    /// Finished jobs go to `jobs_to_remove` and are unregistered. Recorded
    /// jobs the node did not report are unregistered as missing.
    ///
    /// # Panics
    ///
    /// Panics if a reported job belongs to another cell or node.
    pub fn process_jobs(
        &mut self,
        node_id: NodeId,
        current_jobs: &[Job],
        jobs_to_abort: &mut Vec<Job>,
        jobs_to_remove: &mut Vec<Job>,
        context: &mut JobContext<'_>,
    ) -> Result<()> {
        self.edges
            .update_capacities(&*context.node_tracker, false, Instant::now());

        let address = context.node_tracker.get_node(node_id)?.default_address().to_string();
        let job_timeout = self.config.job_timeout();
        let now = Utc::now();

        for job in current_jobs {
            let job_id = job.job_id();
            assert_eq!(
                job_id.cell_tag(),
                self.cell_tag,
                "Job {} has a foreign cell tag",
                job_id
            );
            assert_eq!(
                job_id.object_type(),
                Some(ObjectType::MasterJob),
                "Job {} has a non-job id",
                job_id
            );
            assert_eq!(
                job.node_id(),
                node_id,
                "Job {} reported by node {} belongs to node {}",
                job_id,
                node_id,
                job.node_id()
            );

            match job.state() {
                JobState::Waiting | JobState::Running => {
                    let timed_out = (now - job.start_time())
                        .to_std()
                        .is_ok_and(|elapsed| elapsed > job_timeout);
                    if timed_out {
                        warn!(
                            job_id = %job_id,
                            job_type = %job.job_type(),
                            address = %address,
                            chunk = %job.chunk_id_with_indexes(),
                            "Job timed out"
                        );
                        jobs_to_abort.push(job.clone());
                    } else {
                        debug!(
                            job_id = %job_id,
                            job_type = %job.job_type(),
                            address = %address,
                            state = %job.state(),
                            "Job is {}",
                            job.state()
                        );
                    }
                }
                JobState::Completed | JobState::Failed | JobState::Aborted => {
                    jobs_to_remove.push(job.clone());

                    if job.state() == JobState::Completed {
                        debug!(
                            job_id = %job_id,
                            job_type = %job.job_type(),
                            address = %address,
                            chunk = %job.chunk_id_with_indexes(),
                            "Job completed"
                        );
                    } else {
                        let no_such_chunk = job
                            .error()
                            .is_some_and(|error| error.find_matching(JobErrorCode::NoSuchChunk));
                        if job.job_type() == JobType::RemoveChunk && !no_such_chunk {
                            context
                                .node_tracker
                                .get_node_mut(node_id)?
                                .add_to_chunk_removal_queue(job.chunk_id_with_indexes());
                        }

                        let error = job.error().map(ToString::to_string).unwrap_or_default();
                        warn!(
                            job_id = %job_id,
                            job_type = %job.job_type(),
                            address = %address,
                            chunk = %job.chunk_id_with_indexes(),
                            error = %error,
                            "Job {}",
                            job.state()
                        );
                    }

                    self.unregister_job(job, context)?;
                }
            }
        }

        let reported: HashSet<ObjectId> = current_jobs.iter().map(Job::job_id).collect();
        let missing: Vec<Job> = context
            .node_tracker
            .get_node(node_id)?
            .id_to_job()
            .values()
            .filter(|job| !reported.contains(&job.job_id()))
            .cloned()
            .collect();

        for job in missing {
            warn!(
                job_id = %job.job_id(),
                job_type = %job.job_type(),
                address = %address,
                chunk = %job.chunk_id_with_indexes(),
                "Job is missing"
            );
            self.unregister_job(&job, context)?;
        }

        Ok(())
    }

    /// Move the traffic of every job with an end at `node_id` from `old` to
    /// the node's current data center
    ///
    /// Covers jobs running on the node and jobs replicating to it.
    pub fn on_node_data_center_changed(
        &mut self,
        node_id: NodeId,
        old: Option<DataCenterId>,
        node_tracker: &NodeTracker,
    ) -> Result<()> {
        node_tracker.get_node(node_id)?;
        let before = |id: NodeId| {
            if id == node_id {
                old
            } else {
                node_tracker.node_data_center(id)
            }
        };
        let after = |id: NodeId| node_tracker.node_data_center(id);

        let affected = node_tracker
            .nodes()
            .flat_map(|node| node.id_to_job().values())
            .filter(|job| {
                job.node_id() == node_id
                    || job
                        .target_replicas()
                        .iter()
                        .any(|replica| replica.node_id == node_id)
            });
        for job in affected {
            self.edges
                .record_flow_with(job, before(job.node_id()), -1, &before);
            self.edges
                .record_flow_with(job, after(job.node_id()), 1, &after);
        }
        Ok(())
    }

    pub fn on_data_center_created(
        &mut self,
        data_center: DataCenterId,
        directory: &dyn DataCenterDirectory,
    ) {
        self.edges
            .on_data_center_created(data_center, directory, Instant::now());
    }

    pub fn on_data_center_destroyed(&mut self, data_center: DataCenterId) {
        self.edges.on_data_center_destroyed(data_center);
    }

    /// Remove a data center from the topology
    ///
    /// Nodes in it fall back to the null data center, and so does the
    /// traffic of every job with an end in it.
    pub fn destroy_data_center(
        &mut self,
        data_center: DataCenterId,
        node_tracker: &mut NodeTracker,
    ) -> Option<DataCenter> {
        let in_data_center =
            |node_id: NodeId| node_tracker.node_data_center(node_id) == Some(data_center);
        let affected: Vec<Job> = node_tracker
            .nodes()
            .flat_map(|node| node.id_to_job().values())
            .filter(|job| {
                in_data_center(job.node_id())
                    || job
                        .target_replicas()
                        .iter()
                        .any(|replica| in_data_center(replica.node_id))
            })
            .cloned()
            .collect();

        for job in &affected {
            let source = node_tracker.node_data_center(job.node_id());
            self.edges.record_flow(job, source, -1, &*node_tracker);
        }

        let destroyed = node_tracker.destroy_data_center(data_center);

        for job in &affected {
            let source = node_tracker.node_data_center(job.node_id());
            self.edges.record_flow(job, source, 1, &*node_tracker);
        }
        self.on_data_center_destroyed(data_center);

        if !affected.is_empty() {
            debug!(
                data_center_id = %data_center,
                jobs = affected.len(),
                "Moved job traffic to the null data center"
            );
        }
        destroyed
    }

    /// Export job counters and inter-DC edge state
    pub fn on_profiling(&self, buffer: &mut dyn SensorBuffer, directory: &dyn DataCenterDirectory) {
        for job_type in JobType::ALL {
            let counters = self.counters(job_type);
            buffer.push_tag("job_type", &job_type.to_string());
            buffer.add_gauge("/running_job_count", counters.running as f64);
            buffer.add_counter("/jobs_started", counters.started);
            buffer.add_counter("/jobs_completed", counters.completed);
            buffer.add_counter("/jobs_failed", counters.failed);
            buffer.add_counter("/jobs_aborted", counters.aborted);
            buffer.pop_tag();
        }

        profile_edges(
            buffer,
            directory,
            self.edges.consumptions(),
            "/inter_dc_edge_consumption",
        );
        profile_edges(
            buffer,
            directory,
            self.edges.capacities(),
            "/inter_dc_edge_capacity",
        );
    }

    /// Forget all jobs and edge state, keeping config and throttler
    pub fn clear(&mut self) {
        self.counters.clear();
        self.edges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::IdGenerator;
    use cellmaster_core_resilience::ThrottlerConfig;
    use cellmaster_observability::RecordingSensorBuffer;
    use chrono::Duration;

    use crate::config::InterDcLimitsConfig;
    use crate::job::{ChunkIdWithIndexes, JobError, NodeResourceLimitsOverrides, TargetReplica};

    const CELL: CellTag = CellTag(1);

    struct Fixture {
        tracker: JobTracker,
        nodes: NodeTracker,
        chunks: ChunkManager,
        generator: IdGenerator,
    }

    impl Fixture {
        fn new(config: DynamicChunkManagerConfig) -> Self {
            Self {
                tracker: JobTracker::new(CELL, 0, Arc::new(config)).unwrap(),
                nodes: NodeTracker::new(),
                chunks: ChunkManager::new(),
                generator: IdGenerator::new(CELL),
            }
        }

        fn context(&mut self) -> (&mut JobTracker, JobContext<'_>) {
            (
                &mut self.tracker,
                JobContext {
                    node_tracker: &mut self.nodes,
                    chunk_manager: &mut self.chunks,
                },
            )
        }

        fn data_center(&mut self, name: &str) -> DataCenterId {
            let id = self.generator.next(ObjectType::DataCenter);
            self.nodes.create_data_center(id, name).unwrap();
            self.tracker.on_data_center_created(id, &self.nodes);
            id
        }

        fn node(&mut self, address: &str, data_center: Option<DataCenterId>) -> NodeId {
            let id = self.nodes.register_node(address);
            self.nodes.set_node_data_center(id, data_center).unwrap();
            id
        }

        fn job(&mut self, job_type: JobType, node: NodeId, target: NodeId, size: i64) -> Job {
            let chunk_id = self.generator.next(ObjectType::Chunk);
            self.chunks.create_chunk(chunk_id);
            Job::new(
                self.tracker.generate_job_id(),
                job_type,
                node,
                ChunkIdWithIndexes::new(chunk_id),
                NodeResources {
                    replication_slots: 1,
                    replication_data_size: size,
                    repair_data_size: size,
                    ..Default::default()
                },
                vec![TargetReplica::new(target)],
            )
        }

        fn register(&mut self, job: &Job) {
            let mut to_start = Vec::new();
            let mut usage = NodeResources::default();
            let (tracker, mut context) = self.context();
            tracker
                .register_job(Some(job.clone()), &mut to_start, &mut usage, &mut context)
                .unwrap();
            assert_eq!(to_start, vec![job.clone()]);
        }

        fn process(&mut self, node: NodeId, reported: &[Job]) -> (Vec<Job>, Vec<Job>) {
            let mut to_abort = Vec::new();
            let mut to_remove = Vec::new();
            let (tracker, mut context) = self.context();
            tracker
                .process_jobs(node, reported, &mut to_abort, &mut to_remove, &mut context)
                .unwrap();
            (to_abort, to_remove)
        }
    }

    fn config_with_default_capacity(default_capacity: i64) -> DynamicChunkManagerConfig {
        DynamicChunkManagerConfig {
            inter_dc_limits: InterDcLimitsConfig {
                default_capacity,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_register_updates_counters_usage_and_chunk() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);
        let job = f.job(JobType::ReplicateChunk, node, node, 10);

        let mut to_start = Vec::new();
        let mut usage = NodeResources::default();
        let (tracker, mut context) = f.context();
        tracker
            .register_job(Some(job.clone()), &mut to_start, &mut usage, &mut context)
            .unwrap();
        tracker
            .register_job(None, &mut to_start, &mut usage, &mut context)
            .unwrap();

        assert_eq!(to_start.len(), 1);
        assert_eq!(usage.replication_slots, 1);
        assert_eq!(usage.replication_data_size, 10);
        assert_eq!(f.nodes.find_node(node).unwrap().id_to_job().len(), 1);
        assert_eq!(f.chunks.find_chunk(job.chunk_id()).unwrap().job(), Some(job.job_id()));

        let counters = f.tracker.counters(JobType::ReplicateChunk);
        assert_eq!((counters.running, counters.started), (1, 1));
    }

    #[test]
    fn test_unregister_counts_terminal_state_and_refreshes_chunk() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);
        let job = f.job(JobType::RepairChunk, node, node, 10);
        f.register(&job);

        let finished = job.clone().with_state(JobState::Failed);
        let (tracker, mut context) = f.context();
        tracker.unregister_job(&finished, &mut context).unwrap();

        let counters = f.tracker.counters(JobType::RepairChunk);
        assert_eq!((counters.running, counters.failed), (0, 1));
        assert_eq!(f.chunks.find_chunk(job.chunk_id()).unwrap().job(), None);
        assert!(f.chunks.refresh_queue().contains(&job.chunk_id()));
        assert_eq!(f.tracker.edges().consumption(None, None), 0);
    }

    #[test]
    fn test_vanished_chunk_is_not_an_error() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);
        let job = f.job(JobType::ReplicateChunk, node, node, 10);

        f.chunks.clear();
        f.register(&job);

        let (tracker, mut context) = f.context();
        tracker.unregister_job(&job, &mut context).unwrap();
        assert!(f.chunks.refresh_queue().is_empty());
    }

    #[test]
    fn test_edge_saturation_through_registration() {
        let mut f = Fixture::new(config_with_default_capacity(100));
        let a = f.data_center("a");
        let b = f.data_center("b");
        let source = f.node("a1:9012", Some(a));
        let target = f.node("b1:9012", Some(b));
        f.tracker.init_inter_dc_edges(&f.nodes);

        let first = f.job(JobType::ReplicateChunk, source, target, 60);
        f.register(&first);
        assert!(f
            .tracker
            .unsaturated_inter_dc_edges_starting_from(Some(a))
            .any(|dst| dst == Some(b)));

        let second = f.job(JobType::ReplicateChunk, source, target, 50);
        f.register(&second);
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 110);
        assert!(!f
            .tracker
            .unsaturated_inter_dc_edges_starting_from(Some(a))
            .any(|dst| dst == Some(b)));

        let (tracker, mut context) = f.context();
        tracker.unregister_job(&first, &mut context).unwrap();
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 50);
        assert!(f.tracker.has_unsaturated_inter_dc_edge_starting_from(Some(a)));
    }

    #[test]
    fn test_reconciliation_aborts_timed_out_and_drops_missing() {
        let mut config = DynamicChunkManagerConfig::default();
        config.job_timeout_s = 3600;
        let mut f = Fixture::new(config);
        let node = f.node("n1:9012", None);

        let j1 = f.job(JobType::ReplicateChunk, node, node, 1).with_state(JobState::Running);
        let j2 = f.job(JobType::ReplicateChunk, node, node, 1).with_state(JobState::Failed);
        let j3 = f
            .job(JobType::ReplicateChunk, node, node, 1)
            .with_state(JobState::Running)
            .with_start_time(Utc::now() - Duration::hours(2));
        for job in [&j1, &j2, &j3] {
            f.register(job);
        }

        let (to_abort, to_remove) = f.process(node, &[j1.clone(), j3.clone()]);

        assert!(to_remove.is_empty());
        assert_eq!(to_abort, vec![j3.clone()]);

        let remaining = f.nodes.find_node(node).unwrap().id_to_job();
        assert!(remaining.contains_key(&j1.job_id()));
        assert!(remaining.contains_key(&j3.job_id()));
        assert!(!remaining.contains_key(&j2.job_id()));

        let counters = f.tracker.counters(JobType::ReplicateChunk);
        assert_eq!((counters.running, counters.failed), (2, 1));
    }

    #[test]
    fn test_failed_removal_is_retried_unless_chunk_is_gone() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);

        let retried = f.job(JobType::RemoveChunk, node, node, 0);
        let gone = f.job(JobType::RemoveChunk, node, node, 0);
        f.register(&retried);
        f.register(&gone);

        let mut retried_report = retried.clone().with_state(JobState::Failed);
        retried_report.set_error(Some(JobError::new(JobErrorCode::Generic, "Disk is busy")));
        let mut gone_report = gone.clone().with_state(JobState::Aborted);
        gone_report.set_error(Some(
            JobError::new(JobErrorCode::Generic, "Removal failed")
                .with_inner(JobError::new(JobErrorCode::NoSuchChunk, "No such chunk")),
        ));

        let (to_abort, to_remove) = f.process(node, &[retried_report, gone_report]);
        assert!(to_abort.is_empty());
        assert_eq!(to_remove.len(), 2);

        let queue = f.nodes.find_node(node).unwrap().chunk_removal_queue();
        assert!(queue.contains(&retried.chunk_id_with_indexes()));
        assert!(!queue.contains(&gone.chunk_id_with_indexes()));

        let counters = f.tracker.counters(JobType::RemoveChunk);
        assert_eq!((counters.running, counters.failed, counters.aborted), (0, 1, 1));
    }

    #[test]
    fn test_completed_jobs_are_removed() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);
        let job = f.job(JobType::SealChunk, node, node, 0);
        f.register(&job);

        let (_, to_remove) = f.process(node, &[job.clone().with_state(JobState::Completed)]);
        assert_eq!(to_remove.len(), 1);
        assert!(f.nodes.find_node(node).unwrap().id_to_job().is_empty());
        assert_eq!(f.tracker.counters(JobType::SealChunk).completed, 1);
    }

    #[test]
    #[should_panic(expected = "belongs to node")]
    fn test_job_from_another_node_panics() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let first = f.node("n1:9012", None);
        let second = f.node("n2:9012", None);
        let job = f.job(JobType::ReplicateChunk, first, first, 1);
        f.register(&job);

        f.process(second, &[job]);
    }

    #[test]
    fn test_generated_job_ids_are_tagged() {
        let f = Fixture::new(DynamicChunkManagerConfig::default());
        let a = f.tracker.generate_job_id();
        let b = f.tracker.generate_job_id();

        assert_ne!(a, b);
        assert_eq!(a.cell_tag(), CELL);
        assert_eq!(a.object_type(), Some(ObjectType::MasterJob));
    }

    #[test]
    fn test_throttler_overdraft_and_reconfigure() {
        let mut config = DynamicChunkManagerConfig::default();
        config.job_throttler = ThrottlerConfig {
            limit: Some(1),
            period_ms: 3_600_000,
        };
        let mut f = Fixture::new(config);
        let node = f.node("n1:9012", None);

        let first = f.job(JobType::RemoveChunk, node, node, 0);
        f.register(&first);
        assert!(!f.tracker.is_overdraft());

        let second = f.job(JobType::RemoveChunk, node, node, 0);
        f.register(&second);
        assert!(f.tracker.is_overdraft());

        f.tracker
            .on_dynamic_config_changed(Arc::new(DynamicChunkManagerConfig::default()))
            .unwrap();
        assert!(!f.tracker.is_overdraft());
    }

    #[test]
    fn test_node_data_center_change_moves_flow() {
        let mut f = Fixture::new(config_with_default_capacity(100));
        let a = f.data_center("a");
        let b = f.data_center("b");
        let node = f.node("n1:9012", Some(a));
        let target = f.node("n2:9012", Some(b));
        f.tracker.init_inter_dc_edges(&f.nodes);

        let job = f.job(JobType::ReplicateChunk, node, target, 40);
        f.register(&job);
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 40);

        let old = f.nodes.set_node_data_center(node, Some(b)).unwrap();
        f.tracker
            .on_node_data_center_changed(node, old, &f.nodes)
            .unwrap();

        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 0);
        assert_eq!(f.tracker.edges().consumption(Some(b), Some(b)), 40);
    }

    #[test]
    fn test_target_data_center_change_moves_flow() {
        let mut f = Fixture::new(config_with_default_capacity(100));
        let a = f.data_center("a");
        let b = f.data_center("b");
        let source = f.node("a1:9012", Some(a));
        let target = f.node("b1:9012", Some(b));
        f.tracker.init_inter_dc_edges(&f.nodes);

        let job = f.job(JobType::ReplicateChunk, source, target, 40);
        f.register(&job);

        let old = f.nodes.set_node_data_center(target, Some(a)).unwrap();
        f.tracker
            .on_node_data_center_changed(target, old, &f.nodes)
            .unwrap();
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 0);
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(a)), 40);
        assert!(f.tracker.has_unsaturated_inter_dc_edge_starting_from(Some(a)));

        let (tracker, mut context) = f.context();
        tracker.unregister_job(&job, &mut context).unwrap();
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 0);
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(a)), 0);
    }

    #[test]
    fn test_destroyed_data_center_traffic_moves_to_null() {
        let mut f = Fixture::new(config_with_default_capacity(100));
        let a = f.data_center("a");
        let b = f.data_center("b");
        let source = f.node("a1:9012", Some(a));
        let target = f.node("b1:9012", Some(b));
        f.tracker.init_inter_dc_edges(&f.nodes);

        let job = f.job(JobType::ReplicateChunk, source, target, 30);
        f.register(&job);
        assert_eq!(f.tracker.edges().consumption(Some(a), Some(b)), 30);

        let destroyed = f.tracker.destroy_data_center(b, &mut f.nodes).unwrap();
        assert_eq!(destroyed.name(), "b");
        assert_eq!(f.nodes.find_node(target).unwrap().data_center(), None);
        assert_eq!(f.tracker.edges().consumption(Some(a), None), 30);
        assert!(!f.tracker.edges().consumptions().contains_key(&Some(b)));

        let (tracker, mut context) = f.context();
        tracker.unregister_job(&job, &mut context).unwrap();
        assert_eq!(f.tracker.edges().consumption(Some(a), None), 0);
        assert!(f.tracker.destroy_data_center(b, &mut f.nodes).is_none());
    }

    #[test]
    fn test_override_resource_limits() {
        let mut f = Fixture::new(DynamicChunkManagerConfig::default());
        let node = f.node("n1:9012", None);
        f.nodes
            .find_node_mut(node)
            .unwrap()
            .set_resource_limits_overrides(NodeResourceLimitsOverrides {
                removal_slots: Some(2),
                ..Default::default()
            });

        let mut limits = NodeResources {
            removal_slots: 8,
            replication_slots: 8,
            ..Default::default()
        };
        f.tracker
            .override_resource_limits(&mut limits, f.nodes.find_node(node).unwrap());
        assert_eq!((limits.removal_slots, limits.replication_slots), (2, 8));
    }

    #[test]
    fn test_profiling_reports_counters_and_edges() {
        let mut f = Fixture::new(config_with_default_capacity(100));
        let a = f.data_center("a");
        let source = f.node("a1:9012", Some(a));
        let target = f.node("null1:9012", None);
        f.tracker.init_inter_dc_edges(&f.nodes);

        let job = f.job(JobType::ReplicateChunk, source, target, 30);
        f.register(&job);

        let mut buffer = RecordingSensorBuffer::new();
        f.tracker.on_profiling(&mut buffer, &f.nodes);

        assert_eq!(
            buffer.find("/running_job_count", &[("job_type", "replicate_chunk")]),
            Some(1.0)
        );
        assert_eq!(
            buffer.find("/jobs_started", &[("job_type", "replicate_chunk")]),
            Some(1.0)
        );
        assert_eq!(
            buffer.find("/jobs_failed", &[("job_type", "remove_chunk")]),
            Some(0.0)
        );
        assert_eq!(
            buffer.find(
                "/inter_dc_edge_consumption",
                &[("source_data_center", "a"), ("destination_data_center", "null")]
            ),
            Some(30.0)
        );
        assert_eq!(buffer.tag_depth(), 0);
    }
}
