/*!
 * Node heartbeat handling
 *
 * A storage node reports the jobs it is running. The master reconciles them
 * with its own records, then fills the node's free capacity with new jobs
 * unless the dispatch throttler is in overdraft.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use cellmaster_chunk_server::{Job, JobError, JobState, Node, NodeId, NodeResources};
use cellmaster_core_object::ObjectId;

use crate::automaton::MasterAutomaton;
use crate::error::Result;

/// A job as its node reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: ObjectId,
    pub state: JobState,
    #[serde(default)]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub address: String,
    pub resource_limits: NodeResources,
    #[serde(default)]
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub node_id: NodeId,
    pub jobs_to_start: Vec<Job>,
    pub jobs_to_abort: Vec<ObjectId>,
    pub jobs_to_remove: Vec<ObjectId>,
    /// Reported limits after administrative overrides
    pub resource_limits: NodeResources,
    /// Usage of every job the node should be running after this heartbeat
    pub resource_usage: NodeResources,
}

/// Picks new jobs for a node with free capacity
pub trait JobScheduler {
    fn schedule_jobs(
        &mut self,
        node: &Node,
        resource_limits: &NodeResources,
        generate_job_id: &dyn Fn() -> ObjectId,
    ) -> Vec<Job>;
}

/// Schedules nothing
#[derive(Debug, Default)]
pub struct NullScheduler;

impl JobScheduler for NullScheduler {
    fn schedule_jobs(
        &mut self,
        _node: &Node,
        _resource_limits: &NodeResources,
        _generate_job_id: &dyn Fn() -> ObjectId,
    ) -> Vec<Job> {
        Vec::new()
    }
}

/// Reconcile one heartbeat and dispatch new jobs
pub fn process_heartbeat(
    automaton: &mut MasterAutomaton,
    request: &HeartbeatRequest,
    scheduler: &mut dyn JobScheduler,
) -> Result<HeartbeatResponse> {
    let node_id = automaton.node_tracker_mut().register_node(&request.address);
    let mut response = HeartbeatResponse {
        node_id,
        ..Default::default()
    };

    let node = automaton.node_tracker_mut().get_node_mut(node_id)?;
    let mut current_jobs = Vec::with_capacity(request.jobs.len());
    let mut seen = HashSet::with_capacity(request.jobs.len());
    for status in &request.jobs {
        if !seen.insert(status.job_id) {
            warn!(job_id = %status.job_id, address = %request.address, "Job reported twice");
            continue;
        }

        match node.find_job_mut(status.job_id) {
            Some(job) => {
                job.set_state(status.state);
                job.set_error(status.error.clone());
                current_jobs.push(job.clone());
            }
            None => {
                warn!(
                    job_id = %status.job_id,
                    address = %request.address,
                    state = %status.state,
                    "Unknown job reported, removing"
                );
                response.jobs_to_remove.push(status.job_id);
            }
        }
    }

    let (tracker, mut context) = automaton.job_context();
    let mut jobs_to_abort = Vec::new();
    let mut jobs_to_remove = Vec::new();
    tracker.process_jobs(
        node_id,
        &current_jobs,
        &mut jobs_to_abort,
        &mut jobs_to_remove,
        &mut context,
    )?;
    response.jobs_to_abort = jobs_to_abort.iter().map(Job::job_id).collect();
    response
        .jobs_to_remove
        .extend(jobs_to_remove.iter().map(Job::job_id));

    let node = context.node_tracker.get_node(node_id)?;
    let mut resource_limits = request.resource_limits;
    tracker.override_resource_limits(&mut resource_limits, node);
    response.resource_limits = resource_limits;
    for job in node.id_to_job().values() {
        response.resource_usage += job.resource_usage();
    }

    if tracker.is_overdraft() {
        debug!(address = %request.address, "Job throttler overdraft, scheduling skipped");
        return Ok(response);
    }

    let new_jobs = {
        let tracker = &*tracker;
        scheduler.schedule_jobs(node, &resource_limits, &|| tracker.generate_job_id())
    };
    for job in new_jobs {
        tracker.register_job(
            Some(job),
            &mut response.jobs_to_start,
            &mut response.resource_usage,
            &mut context,
        )?;
    }

    debug!(
        address = %request.address,
        started = response.jobs_to_start.len(),
        aborted = response.jobs_to_abort.len(),
        removed = response.jobs_to_remove.len(),
        "Heartbeat processed"
    );
    Ok(response)
}
