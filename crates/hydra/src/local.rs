//! In-process hydra for a single peer
//!
//! Commits are applied directly to the local automaton. Role flags can be
//! flipped at runtime and commit failures injected, which makes this the
//! facade used by tests and by a standalone master.
//!
//! Only the most recent commits are kept for inspection; the committed
//! version counts all of them.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::{HydraError, Result};
use crate::invoker::AutomatonInvoker;
use crate::manager::{HydraManager, HydraStatus, PeerStatus};

type ApplyFn<S, M> = dyn Fn(&mut S, &M) + Send + Sync;

/// Recent commits retained by default
pub const DEFAULT_CHANGELOG_CAPACITY: usize = 1024;

pub struct LocalHydra<S, M> {
    invoker: AutomatonInvoker<S>,
    status: Arc<PeerStatus>,
    apply: Arc<ApplyFn<S, M>>,
    pending_failures: AtomicUsize,
    committed_version: AtomicU64,
    changelog_capacity: usize,
    changelog: Mutex<VecDeque<M>>,
}

impl<S, M> LocalHydra<S, M>
where
    S: Send + 'static,
    M: Clone + Send + Sync + 'static,
{
    pub fn new<F>(invoker: AutomatonInvoker<S>, status: Arc<PeerStatus>, apply: F) -> Self
    where
        F: Fn(&mut S, &M) + Send + Sync + 'static,
    {
        Self {
            invoker,
            status,
            apply: Arc::new(apply),
            pending_failures: AtomicUsize::new(0),
            committed_version: AtomicU64::new(0),
            changelog_capacity: DEFAULT_CHANGELOG_CAPACITY,
            changelog: Mutex::new(VecDeque::new()),
        }
    }

    /// Retain at most `capacity` recent commits; zero keeps none
    pub fn with_changelog_capacity(mut self, capacity: usize) -> Self {
        self.changelog_capacity = capacity;
        self
    }

    pub fn peer_status(&self) -> Arc<PeerStatus> {
        self.status.clone()
    }

    /// Make the next `count` commits fail with [`HydraError::CommitFailed`]
    pub fn fail_next_commits(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// The most recent committed mutations, in log order
    pub fn changelog(&self) -> Vec<M> {
        match self.changelog.lock() {
            Ok(log) => log.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Number of mutations committed since start
    pub fn committed_version(&self) -> u64 {
        self.committed_version.load(Ordering::Acquire)
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S, M> HydraStatus for LocalHydra<S, M>
where
    S: Send + 'static,
    M: Send + Sync + 'static,
{
    fn is_leader(&self) -> bool {
        self.status.is_leader()
    }

    fn has_active_quorum(&self) -> bool {
        self.status.has_active_quorum()
    }

    fn is_recovery(&self) -> bool {
        self.status.is_recovery()
    }
}

#[async_trait]
impl<S, M> HydraManager<M> for LocalHydra<S, M>
where
    S: Send + 'static,
    M: Clone + Send + Sync + 'static,
{
    async fn commit_mutation(&self, mutation: M) -> Result<()> {
        if !self.status.is_leader() {
            return Err(HydraError::NotLeader);
        }
        if !self.status.has_active_quorum() {
            return Err(HydraError::NoQuorum);
        }
        if self.take_injected_failure() {
            warn!("Injected mutation commit failure");
            return Err(HydraError::CommitFailed("injected failure".to_string()));
        }

        let apply = self.apply.clone();
        let logged = mutation.clone();
        self.invoker
            .call(move |state| apply(state, &mutation))
            .await?;

        let version = self.committed_version.fetch_add(1, Ordering::AcqRel) + 1;
        if self.changelog_capacity > 0 {
            let mut log = match self.changelog.lock() {
                Ok(log) => log,
                Err(poisoned) => poisoned.into_inner(),
            };
            if log.len() == self.changelog_capacity {
                log.pop_front();
            }
            log.push_back(logged);
        }
        debug!(version, "Mutation committed");
        Ok(())
    }
}
