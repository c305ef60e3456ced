//! Zombie-object garbage collector
//!
//! An object whose reference count drops to zero becomes a zombie. It stays
//! in the zombie queue, which is part of replicated state, until a
//! destroy-objects mutation carrying its id commits.
//!
//! ```text
//!   unref → 0          sweep (leader)            apply
//! ──────────────► queue ─────────────► mutation ────────► destroy + dequeue
//!    enqueue          first N ids        commit
//! ```
//!
//! [`GarbageCollector::collect`] returns a future that resolves when the
//! queue drains. It is shared by everybody who asked since the queue last
//! became non-empty.

use cellmaster_core_object::ObjectId;
use cellmaster_hydra::{HydraStatus, LoadContext, SaveContext};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::metrics::GcMetrics;

/// Resolves once the zombie queue is empty
pub type CollectFuture = Shared<BoxFuture<'static, ()>>;

/// Payload of the destroy-objects mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyObjectsRequest {
    pub object_ids: Vec<ObjectId>,
}

struct CollectState {
    future: CollectFuture,
    promise: Option<oneshot::Sender<()>>,
}

impl CollectState {
    fn resolved() -> Self {
        Self {
            future: future::ready(()).boxed().shared(),
            promise: None,
        }
    }

    fn pending() -> Self {
        let (tx, rx) = oneshot::channel::<()>();
        let future = async move {
            // A dropped promise never resolves the future
            if rx.await.is_err() {
                future::pending::<()>().await;
            }
        };
        Self {
            future: future.boxed().shared(),
            promise: Some(tx),
        }
    }

    fn is_pending(&self) -> bool {
        self.promise.is_some()
    }

    fn resolve(&mut self) {
        if let Some(promise) = self.promise.take() {
            let _ = promise.send(());
        }
    }
}

/// Thread-safe access to the current collect future
#[derive(Clone)]
pub struct CollectHandle {
    state: Arc<Mutex<CollectState>>,
}

impl CollectHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectState::resolved())),
        }
    }

    pub fn collect(&self) -> CollectFuture {
        self.lock().future.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollectState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct GarbageCollector {
    status: Arc<dyn HydraStatus>,
    zombies: BTreeSet<ObjectId>,
    collect: CollectHandle,
    metrics: GcMetrics,
    max_objects_per_sweep: usize,
}

impl GarbageCollector {
    pub fn new(status: Arc<dyn HydraStatus>, metrics: GcMetrics, max_objects_per_sweep: usize) -> Self {
        metrics.queue_size.set(0);
        Self {
            status,
            zombies: BTreeSet::new(),
            collect: CollectHandle::new(),
            metrics,
            max_objects_per_sweep: max_objects_per_sweep.max(1),
        }
    }

    /// Add a zero-refcount object to the queue
    ///
    /// # Panics
    ///
    /// Panics if `id` is already queued.
    pub fn enqueue(&mut self, id: ObjectId) {
        if self.zombies.is_empty() {
            let mut state = self.collect.lock();
            if !state.is_pending() {
                *state = CollectState::pending();
            }
        }

        assert!(
            self.zombies.insert(id),
            "Object {} is already in the GC queue",
            id
        );
        self.metrics.queue_size.inc();
    }

    /// Remove a destroyed object from the queue
    ///
    /// # Panics
    ///
    /// Panics if `id` is not queued.
    pub fn dequeue(&mut self, id: ObjectId) {
        assert!(
            self.zombies.remove(&id),
            "Object {} is not in the GC queue",
            id
        );
        self.metrics.queue_size.dec();

        if self.zombies.is_empty() {
            if !self.status.is_recovery() {
                debug!("GC queue is empty");
            }
            self.collect.lock().resolve();
        }
    }

    pub fn collect(&self) -> CollectFuture {
        self.collect.collect()
    }

    pub fn collect_handle(&self) -> CollectHandle {
        self.collect.clone()
    }

    /// Build the next sweep batch
    ///
    /// Returns `None` unless this peer leads with an active quorum and there
    /// is something to collect. Ids are taken in ascending order so every
    /// replica agrees on the batch.
    pub fn prepare_sweep(&self) -> Option<DestroyObjectsRequest> {
        if !self.status.is_leader() || !self.status.has_active_quorum() {
            return None;
        }
        if self.zombies.is_empty() {
            return None;
        }

        let object_ids: Vec<ObjectId> = self
            .zombies
            .iter()
            .take(self.max_objects_per_sweep)
            .copied()
            .collect();

        debug!(
            count = object_ids.len(),
            queue_size = self.zombies.len(),
            "Starting GC sweep"
        );
        Some(DestroyObjectsRequest { object_ids })
    }

    pub fn is_zombie(&self, id: ObjectId) -> bool {
        self.zombies.contains(&id)
    }

    pub fn zombie_count(&self) -> usize {
        self.zombies.len()
    }

    pub fn zombies(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.zombies.iter().copied()
    }

    pub fn max_objects_per_sweep(&self) -> usize {
        self.max_objects_per_sweep
    }

    pub fn set_max_objects_per_sweep(&mut self, max: usize) {
        self.max_objects_per_sweep = max.max(1);
    }

    pub fn metrics(&self) -> &GcMetrics {
        &self.metrics
    }

    pub fn save<W: Write>(&self, context: &mut SaveContext<W>) -> cellmaster_hydra::Result<()> {
        context.save(&self.zombies)
    }

    pub fn load<R: Read>(&mut self, context: &mut LoadContext<R>) -> cellmaster_hydra::Result<()> {
        self.restore(context.load()?);
        Ok(())
    }

    /// Replace the queue with zombies decoded from a snapshot
    pub fn restore(&mut self, zombies: BTreeSet<ObjectId>) {
        self.zombies = zombies;
        self.metrics.queue_size.set(self.zombies.len() as i64);

        let mut state = self.collect.lock();
        match (self.zombies.is_empty(), state.is_pending()) {
            (true, true) => state.resolve(),
            (false, false) => *state = CollectState::pending(),
            _ => {}
        }
    }

    /// Drop every zombie and resolve the collect future
    pub fn clear(&mut self) {
        self.zombies.clear();
        self.metrics.queue_size.set(0);

        let mut state = self.collect.lock();
        state.resolve();
        *state = CollectState::resolved();
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("zombies", &self.zombies.len())
            .field("max_objects_per_sweep", &self.max_objects_per_sweep)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::{CellTag, IdGenerator, ObjectType};
    use cellmaster_hydra::PeerStatus;

    fn gc_with(status: Arc<PeerStatus>, max: usize) -> GarbageCollector {
        GarbageCollector::new(status, GcMetrics::new(), max)
    }

    fn ids(count: usize) -> Vec<ObjectId> {
        let mut generator = IdGenerator::new(CellTag(1));
        let mut ids: Vec<_> = (0..count).map(|_| generator.next(ObjectType::MapNode)).collect();
        ids.sort();
        ids
    }

    fn is_resolved(gc: &GarbageCollector) -> bool {
        gc.collect().now_or_never().is_some()
    }

    #[test]
    fn test_collect_tracks_queue_emptiness() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        let ids = ids(3);

        assert!(is_resolved(&gc));

        for (n, id) in ids.iter().enumerate() {
            gc.enqueue(*id);
            assert_eq!(gc.metrics().queue_size.get(), n as i64 + 1);
            assert!(!is_resolved(&gc));
        }

        gc.dequeue(ids[1]);
        gc.dequeue(ids[0]);
        assert!(!is_resolved(&gc));
        assert_eq!(gc.metrics().queue_size.get(), 1);

        gc.dequeue(ids[2]);
        assert!(is_resolved(&gc));
        assert_eq!(gc.metrics().queue_size.get(), 0);
    }

    #[test]
    fn test_future_is_shared_across_enqueues() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        let ids = ids(2);

        gc.enqueue(ids[0]);
        let early = gc.collect();
        gc.enqueue(ids[1]);
        let late = gc.collect();

        gc.dequeue(ids[0]);
        gc.dequeue(ids[1]);

        assert!(early.now_or_never().is_some());
        assert!(late.now_or_never().is_some());
    }

    #[test]
    fn test_handle_observes_new_futures() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        let handle = gc.collect_handle();
        let id = ids(1)[0];

        gc.enqueue(id);
        assert!(handle.collect().now_or_never().is_none());
        gc.dequeue(id);
        assert!(handle.collect().now_or_never().is_some());
    }

    #[test]
    #[should_panic(expected = "already in the GC queue")]
    fn test_duplicate_enqueue_panics() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        let id = ids(1)[0];
        gc.enqueue(id);
        gc.enqueue(id);
    }

    #[test]
    #[should_panic(expected = "is not in the GC queue")]
    fn test_dequeue_missing_panics() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        gc.dequeue(ids(1)[0]);
    }

    #[test]
    fn test_sweep_is_bounded_and_ordered() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 2);
        let ids = ids(5);
        for id in ids.iter().rev() {
            gc.enqueue(*id);
        }

        let request = gc.prepare_sweep().unwrap();
        assert_eq!(request.object_ids, ids[..2].to_vec());
    }

    #[test]
    fn test_sweep_requires_leader_quorum_and_zombies() {
        let status = Arc::new(PeerStatus::leader());
        let mut gc = gc_with(status.clone(), 10);

        assert!(gc.prepare_sweep().is_none());

        gc.enqueue(ids(1)[0]);
        assert!(gc.prepare_sweep().is_some());

        status.set_active_quorum(false);
        assert!(gc.prepare_sweep().is_none());

        status.set_active_quorum(true);
        status.set_leader(false);
        assert!(gc.prepare_sweep().is_none());
    }

    #[test]
    fn test_replicas_choose_identical_batches() {
        let ids = ids(7);
        let mut first = gc_with(Arc::new(PeerStatus::leader()), 3);
        let mut second = gc_with(Arc::new(PeerStatus::leader()), 3);

        for id in &ids {
            first.enqueue(*id);
        }
        for id in ids.iter().rev() {
            second.enqueue(*id);
        }

        assert_eq!(first.prepare_sweep(), second.prepare_sweep());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        let ids = ids(4);
        for id in &ids {
            gc.enqueue(*id);
        }

        let mut save = SaveContext::new(Vec::new(), 1).unwrap();
        gc.save(&mut save).unwrap();
        let bytes = save.finish().unwrap();

        let mut restored = gc_with(Arc::new(PeerStatus::follower()), 10);
        let mut load = LoadContext::new(bytes.as_slice(), 1..=1).unwrap();
        restored.load(&mut load).unwrap();

        assert_eq!(restored.zombies().collect::<Vec<_>>(), ids);
        assert_eq!(restored.metrics().queue_size.get(), 4);
        assert!(!is_resolved(&restored));
    }

    #[test]
    fn test_clear_resolves_pending_future() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 10);
        gc.enqueue(ids(1)[0]);
        let pending = gc.collect();

        gc.clear();

        assert_eq!(gc.zombie_count(), 0);
        assert!(pending.now_or_never().is_some());
        assert!(is_resolved(&gc));
    }

    #[test]
    fn test_max_objects_is_at_least_one() {
        let mut gc = gc_with(Arc::new(PeerStatus::leader()), 0);
        assert_eq!(gc.max_objects_per_sweep(), 1);
        gc.set_max_objects_per_sweep(5);
        assert_eq!(gc.max_objects_per_sweep(), 5);
    }
}
