//! Inter-datacenter bandwidth accounting
//!
//! Three sparse matrices keyed by `(source, destination)`, where `None` is
//! the null data center of nodes with no data center assigned:
//!
//! - capacities: explicit per-edge budgets from config, refreshed on a
//!   bounded schedule; edges without an entry use the default capacity
//! - consumption: bytes in flight, adjusted on every job start and stop
//! - unsaturated: for each source, destinations with `consumption < capacity`
//!
//! The unsaturated sets are kept in step with every change to the other two
//! so that [`DataCenterEdgeTable::is_unsaturated`] is a single lookup.

use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

use crate::config::InterDcLimitsConfig;
use crate::job::Job;
use crate::node::{DataCenterDirectory, DataCenterId, NodeId};

/// An edge endpoint; `None` is the null data center
pub type EdgeEnd = Option<DataCenterId>;

pub type EdgeMatrix = HashMap<EdgeEnd, HashMap<EdgeEnd, i64>>;

#[derive(Debug)]
pub struct DataCenterEdgeTable {
    limits: InterDcLimitsConfig,
    capped_secondary_cell_count: i64,
    capacities: EdgeMatrix,
    consumption: EdgeMatrix,
    unsaturated: HashMap<EdgeEnd, HashSet<EdgeEnd>>,
    last_update: Option<Instant>,
    /// Default capacity the unsaturated sets were last computed against
    applied_default_capacity: i64,
}

fn endpoints(directory: &dyn DataCenterDirectory) -> Vec<EdgeEnd> {
    std::iter::once(None)
        .chain(directory.alive_data_centers().into_iter().map(Some))
        .collect()
}

fn endpoint_name(directory: &dyn DataCenterDirectory, end: EdgeEnd) -> Option<String> {
    end.and_then(|id| directory.data_center_name(id).map(str::to_string))
}

impl DataCenterEdgeTable {
    /// Budgets are split evenly across `secondary_cell_count` cells
    pub fn new(limits: InterDcLimitsConfig, secondary_cell_count: usize) -> Self {
        let capped_secondary_cell_count = secondary_cell_count.max(1) as i64;
        let applied_default_capacity = limits.default_capacity / capped_secondary_cell_count;
        Self {
            limits,
            capped_secondary_cell_count,
            capacities: EdgeMatrix::new(),
            consumption: EdgeMatrix::new(),
            unsaturated: HashMap::new(),
            last_update: None,
            applied_default_capacity,
        }
    }

    pub fn default_capacity(&self) -> i64 {
        self.limits.default_capacity / self.capped_secondary_cell_count
    }

    pub fn limits(&self) -> &InterDcLimitsConfig {
        &self.limits
    }

    /// Swap in new limits; they apply at the next capacity refresh
    pub fn set_limits(&mut self, limits: InterDcLimitsConfig) {
        if self.limits != limits {
            self.limits = limits;
            self.last_update = None;
        }
    }

    pub fn capacity(&self, source: EdgeEnd, destination: EdgeEnd) -> i64 {
        self.capacities
            .get(&source)
            .and_then(|row| row.get(&destination))
            .copied()
            .unwrap_or_else(|| self.default_capacity())
    }

    pub fn consumption(&self, source: EdgeEnd, destination: EdgeEnd) -> i64 {
        self.consumption
            .get(&source)
            .and_then(|row| row.get(&destination))
            .copied()
            .unwrap_or(0)
    }

    /// Explicit capacities only
    pub fn capacities(&self) -> &EdgeMatrix {
        &self.capacities
    }

    pub fn consumptions(&self) -> &EdgeMatrix {
        &self.consumption
    }

    /// Whether any edge out of `source` has spare capacity
    pub fn is_unsaturated(&self, source: EdgeEnd) -> bool {
        self.unsaturated
            .get(&source)
            .is_some_and(|destinations| !destinations.is_empty())
    }

    /// Destinations reachable from `source` with spare capacity
    pub fn unsaturated_from(&self, source: EdgeEnd) -> impl Iterator<Item = EdgeEnd> + '_ {
        self.unsaturated
            .get(&source)
            .into_iter()
            .flat_map(|destinations| destinations.iter().copied())
    }

    /// Load capacities and build the unsaturated sets from scratch
    pub fn init(&mut self, directory: &dyn DataCenterDirectory, now: Instant) {
        self.update_capacities(directory, true, now);
        self.init_unsaturated_edges(directory);
    }

    /// Rebuild the capacity matrix from config
    ///
    /// Unless `force` is set this is a no-op within the update interval of
    /// the previous refresh. Returns whether a refresh happened.
    pub fn update_capacities(
        &mut self,
        directory: &dyn DataCenterDirectory,
        force: bool,
        now: Instant,
    ) -> bool {
        if !force {
            if let Some(last_update) = self.last_update {
                if now.saturating_duration_since(last_update) <= self.limits.update_interval() {
                    return false;
                }
            }
        }

        let by_name = self.limits.capacities_by_name();
        let ends = endpoints(directory);
        let mut capacities = EdgeMatrix::new();

        for &source in &ends {
            let Some(row) = by_name.get(&endpoint_name(directory, source)) else {
                continue;
            };
            for &destination in &ends {
                if let Some(capacity) = row.get(&endpoint_name(directory, destination)) {
                    capacities
                        .entry(source)
                        .or_default()
                        .insert(destination, capacity / self.capped_secondary_cell_count);
                }
            }
        }

        let previous = std::mem::replace(&mut self.capacities, capacities);
        self.last_update = Some(now);

        if self.default_capacity() != self.applied_default_capacity {
            self.init_unsaturated_edges(directory);
        } else {
            let mut changed = Vec::new();
            for (matrix, other) in [(&previous, &self.capacities), (&self.capacities, &previous)] {
                for (source, row) in matrix {
                    for (destination, capacity) in row {
                        let other_capacity = other.get(source).and_then(|row| row.get(destination));
                        if other_capacity != Some(capacity) {
                            changed.push((*source, *destination));
                        }
                    }
                }
            }
            for (source, destination) in changed {
                self.reevaluate_edge(source, destination);
            }
        }

        debug!(
            explicit_edges = self.capacities.values().map(HashMap::len).sum::<usize>(),
            default_capacity = self.default_capacity(),
            "Inter-DC edge capacities updated"
        );
        true
    }

    /// Recompute every unsaturated set over the alive data centers
    pub fn init_unsaturated_edges(&mut self, directory: &dyn DataCenterDirectory) {
        self.unsaturated.clear();
        self.applied_default_capacity = self.default_capacity();

        let ends = endpoints(directory);
        for &source in &ends {
            for &destination in &ends {
                if self.consumption(source, destination) < self.capacity(source, destination) {
                    self.unsaturated
                        .entry(source)
                        .or_default()
                        .insert(destination);
                }
            }
        }
    }

    /// Charge (`sign = 1`) or release (`sign = -1`) a job's traffic from
    /// `source` to each of its targets
    pub fn record_flow(
        &mut self,
        job: &Job,
        source: EdgeEnd,
        sign: i64,
        directory: &dyn DataCenterDirectory,
    ) {
        self.record_flow_with(job, source, sign, &|node_id| {
            directory.node_data_center(node_id)
        });
    }

    /// Like [`record_flow`](Self::record_flow), resolving each target's data
    /// center through `destination_of`
    pub fn record_flow_with(
        &mut self,
        job: &Job,
        source: EdgeEnd,
        sign: i64,
        destination_of: &dyn Fn(NodeId) -> EdgeEnd,
    ) {
        let Some(size) = job.chargeable_size() else {
            return;
        };

        for replica in job.target_replicas() {
            let destination = destination_of(replica.node_id);
            *self
                .consumption
                .entry(source)
                .or_default()
                .entry(destination)
                .or_insert(0) += sign * size;
            self.reevaluate_edge(source, destination);
        }
    }

    pub fn on_data_center_created(
        &mut self,
        data_center: DataCenterId,
        directory: &dyn DataCenterDirectory,
        now: Instant,
    ) {
        self.update_capacities(directory, true, now);

        let created = Some(data_center);
        self.reevaluate_edge(None, created);
        self.reevaluate_edge(created, None);
        for other in directory.all_data_centers() {
            self.reevaluate_edge(created, Some(other));
            self.reevaluate_edge(Some(other), created);
        }
    }

    /// Forget every edge touching `data_center`, in both roles
    pub fn on_data_center_destroyed(&mut self, data_center: DataCenterId) {
        let destroyed = Some(data_center);

        self.capacities.remove(&destroyed);
        for row in self.capacities.values_mut() {
            row.remove(&destroyed);
        }

        self.consumption.remove(&destroyed);
        for row in self.consumption.values_mut() {
            row.remove(&destroyed);
        }

        self.unsaturated.remove(&destroyed);
        for destinations in self.unsaturated.values_mut() {
            destinations.remove(&destroyed);
        }
    }

    pub fn clear(&mut self) {
        self.capacities.clear();
        self.consumption.clear();
        self.unsaturated.clear();
        self.last_update = None;
    }

    fn reevaluate_edge(&mut self, source: EdgeEnd, destination: EdgeEnd) {
        if self.consumption(source, destination) < self.capacity(source, destination) {
            self.unsaturated
                .entry(source)
                .or_default()
                .insert(destination);
        } else if let Some(destinations) = self.unsaturated.get_mut(&source) {
            // The emptied set stays; it is likely refilled soon
            destinations.remove(&destination);
        }
    }
}
