//! Leader/quorum queries and mutation commit

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

/// Read-only view of this peer's role
pub trait HydraStatus: Send + Sync {
    fn is_leader(&self) -> bool;

    fn has_active_quorum(&self) -> bool;

    /// True while mutations are being replayed from the changelog or a snapshot
    fn is_recovery(&self) -> bool;
}

/// Submits mutations for replication
///
/// A successful return means every replica applies `mutation` in log order.
/// The apply step runs on the automaton; callers must not assume it has
/// happened on any other peer yet.
#[async_trait]
pub trait HydraManager<M: Send + 'static>: HydraStatus {
    async fn commit_mutation(&self, mutation: M) -> Result<()>;
}

/// Mutable role flags of a single peer
#[derive(Debug)]
pub struct PeerStatus {
    leader: AtomicBool,
    active_quorum: AtomicBool,
    recovery: AtomicBool,
}

impl PeerStatus {
    /// Active leader with a quorum
    pub fn leader() -> Self {
        Self {
            leader: AtomicBool::new(true),
            active_quorum: AtomicBool::new(true),
            recovery: AtomicBool::new(false),
        }
    }

    pub fn follower() -> Self {
        Self {
            leader: AtomicBool::new(false),
            active_quorum: AtomicBool::new(true),
            recovery: AtomicBool::new(false),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::Release);
    }

    pub fn set_active_quorum(&self, active: bool) {
        self.active_quorum.store(active, Ordering::Release);
    }

    pub fn set_recovery(&self, recovery: bool) {
        self.recovery.store(recovery, Ordering::Release);
    }
}

impl HydraStatus for PeerStatus {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    fn has_active_quorum(&self) -> bool {
        self.active_quorum.load(Ordering::Acquire)
    }

    fn is_recovery(&self) -> bool {
        self.recovery.load(Ordering::Acquire)
    }
}
