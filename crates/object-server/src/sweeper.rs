//! Leader-side GC driver
//!
//! Every sweep period the leader asks the automaton for the next batch of
//! zombies and commits it as a destroy-objects mutation. A successful commit
//! schedules another sweep right away so a long queue drains quickly; a
//! failed commit waits for the next regular tick.

use cellmaster_hydra::{AutomatonInvoker, HydraManager, PeriodicExecutor, PeriodicHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::gc::{DestroyObjectsRequest, GarbageCollector};
use crate::metrics::GcMetrics;

/// Result of one sweep attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Not leader, no quorum or nothing queued
    Skipped,
    /// Destroy mutation for this many ids committed
    Committed(usize),
    Failed,
}

pub struct GcSweeper {
    executor: PeriodicExecutor,
}

impl GcSweeper {
    pub fn new(period: Duration) -> Self {
        Self {
            executor: PeriodicExecutor::new("gc_sweeper", period),
        }
    }

    /// Start sweeping the collector reachable through `gc_of`
    pub fn start<S, M, H>(
        &mut self,
        invoker: AutomatonInvoker<S>,
        hydra: Arc<H>,
        metrics: GcMetrics,
        gc_of: fn(&S) -> &GarbageCollector,
    ) where
        S: Send + 'static,
        M: From<DestroyObjectsRequest> + Send + 'static,
        H: HydraManager<M> + 'static,
    {
        self.executor.start(move |handle| {
            let invoker = invoker.clone();
            let hydra = hydra.clone();
            let metrics = metrics.clone();
            async move {
                sweep_once::<S, M, H>(&invoker, hydra.as_ref(), &metrics, gc_of, &handle).await;
            }
        });
    }

    pub async fn stop(&mut self) {
        self.executor.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    pub fn period(&self) -> Duration {
        self.executor.period()
    }
}

/// One sweep: pick a batch on the automaton and commit it
pub async fn sweep_once<S, M, H>(
    invoker: &AutomatonInvoker<S>,
    hydra: &H,
    metrics: &GcMetrics,
    gc_of: fn(&S) -> &GarbageCollector,
    handle: &PeriodicHandle,
) -> SweepOutcome
where
    S: Send + 'static,
    M: From<DestroyObjectsRequest> + Send + 'static,
    H: HydraManager<M> + ?Sized,
{
    if !hydra.is_leader() || !hydra.has_active_quorum() {
        return SweepOutcome::Skipped;
    }

    let request = match invoker.call(move |state| gc_of(state).prepare_sweep()).await {
        Ok(Some(request)) => request,
        Ok(None) => return SweepOutcome::Skipped,
        Err(e) => {
            warn!(error = %e, "Cannot prepare GC sweep");
            return SweepOutcome::Failed;
        }
    };

    let count = request.object_ids.len();
    match hydra.commit_mutation(M::from(request)).await {
        Ok(()) => {
            metrics.record_sweep("committed");
            debug!(count, "GC sweep committed");
            handle.schedule_out_of_band();
            SweepOutcome::Committed(count)
        }
        Err(e) => {
            metrics.record_sweep("failed");
            warn!(error = %e, count, "Error committing GC sweep mutation");
            SweepOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmaster_core_object::{CellTag, IdGenerator, ObjectId, ObjectType};
    use cellmaster_hydra::{LocalHydra, PeerStatus};
    use futures::FutureExt;

    struct State {
        gc: GarbageCollector,
    }

    fn gc_of(state: &State) -> &GarbageCollector {
        &state.gc
    }

    fn apply(state: &mut State, request: &DestroyObjectsRequest) {
        for id in &request.object_ids {
            state.gc.dequeue(*id);
        }
    }

    struct Fixture {
        invoker: AutomatonInvoker<State>,
        hydra: Arc<LocalHydra<State, DestroyObjectsRequest>>,
        status: Arc<PeerStatus>,
        metrics: GcMetrics,
        ids: Vec<ObjectId>,
    }

    fn fixture(zombies: usize, max_per_sweep: usize) -> Fixture {
        let status = Arc::new(PeerStatus::leader());
        let metrics = GcMetrics::new();
        let mut gc = GarbageCollector::new(status.clone(), metrics.clone(), max_per_sweep);

        let mut generator = IdGenerator::new(CellTag(1));
        let mut ids = Vec::new();
        for _ in 0..zombies {
            let id = generator.next(ObjectType::MapNode);
            gc.enqueue(id);
            ids.push(id);
        }
        ids.sort();

        let (invoker, _handle) = AutomatonInvoker::spawn("gc_test", State { gc });
        let hydra = Arc::new(LocalHydra::new(invoker.clone(), status.clone(), apply));

        Fixture {
            invoker,
            hydra,
            status,
            metrics,
            ids,
        }
    }

    async fn sweep(f: &Fixture) -> SweepOutcome {
        sweep_once::<State, DestroyObjectsRequest, _>(
            &f.invoker,
            f.hydra.as_ref(),
            &f.metrics,
            gc_of,
            &PeriodicHandle::default(),
        )
        .await
    }

    async fn queue(f: &Fixture) -> Vec<ObjectId> {
        f.invoker
            .call(|state| state.gc.zombies().collect())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_batches_drain_queue_in_order() {
        let f = fixture(3, 2);
        let collected = f.invoker.call(|state| state.gc.collect()).await.unwrap();

        assert_eq!(sweep(&f).await, SweepOutcome::Committed(2));
        assert_eq!(queue(&f).await, vec![f.ids[2]]);
        assert!(collected.clone().now_or_never().is_none());

        assert_eq!(sweep(&f).await, SweepOutcome::Committed(1));
        assert!(queue(&f).await.is_empty());
        assert!(collected.now_or_never().is_some());

        assert_eq!(sweep(&f).await, SweepOutcome::Skipped);
        assert_eq!(f.metrics.sweeps_with_result("committed"), 2);
    }

    #[tokio::test]
    async fn test_follower_does_not_sweep() {
        let f = fixture(2, 10);
        f.status.set_leader(false);

        assert_eq!(sweep(&f).await, SweepOutcome::Skipped);
        assert_eq!(queue(&f).await.len(), 2);
        assert_eq!(f.hydra.committed_version(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_queue_intact() {
        let f = fixture(2, 10);
        f.hydra.fail_next_commits(1);

        assert_eq!(sweep(&f).await, SweepOutcome::Failed);
        assert_eq!(queue(&f).await.len(), 2);
        assert_eq!(f.metrics.sweeps_with_result("failed"), 1);

        assert_eq!(sweep(&f).await, SweepOutcome::Committed(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drains_with_out_of_band_runs() {
        let f = fixture(5, 2);
        let mut sweeper = GcSweeper::new(Duration::from_secs(60));
        sweeper.start::<State, DestroyObjectsRequest, _>(
            f.invoker.clone(),
            f.hydra.clone(),
            f.metrics.clone(),
            gc_of,
        );
        assert!(sweeper.is_running());

        // One regular tick, then out-of-band runs until empty
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(queue(&f).await.is_empty());
        assert_eq!(f.hydra.committed_version(), 3);

        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_backs_off_after_failure() {
        let f = fixture(1, 10);
        f.hydra.fail_next_commits(1);

        let mut sweeper = GcSweeper::new(Duration::from_secs(60));
        sweeper.start::<State, DestroyObjectsRequest, _>(
            f.invoker.clone(),
            f.hydra.clone(),
            f.metrics.clone(),
            gc_of,
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(queue(&f).await.len(), 1);
        assert_eq!(f.metrics.sweeps_with_result("failed"), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(queue(&f).await.is_empty());

        sweeper.stop().await;
    }
}
