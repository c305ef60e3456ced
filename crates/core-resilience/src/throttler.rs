//! Job dispatch throttler
//!
//! Token bucket with overdraft. `limit` units become available per `period`
//! and the bucket holds at most `limit` units. Unlike a classic rate limiter
//! [`JobThrottler::acquire`] always succeeds; whatever the bucket cannot
//! cover is booked as debt and repaid lazily from refilled tokens.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ThrottlerError};

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Throttler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    /// Units per period; `None` disables throttling
    #[serde(default)]
    pub limit: Option<u32>,

    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

fn default_period_ms() -> u64 {
    1000
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            limit: None,
            period_ms: default_period_ms(),
        }
    }
}

impl ThrottlerConfig {
    pub fn validate(&self) -> Result<()> {
        build_limiter(self).map(|_| ())
    }
}

fn build_limiter(config: &ThrottlerConfig) -> Result<Option<Arc<DirectLimiter>>> {
    let Some(limit) = config.limit else {
        return Ok(None);
    };
    let limit = NonZeroU32::new(limit).ok_or(ThrottlerError::ZeroLimit)?;

    if config.period_ms == 0 {
        return Err(ThrottlerError::InvalidPeriod(config.period_ms));
    }

    // One token every period/limit, bursting up to the whole limit
    let replenish = Duration::from_millis(config.period_ms) / limit.get();
    let quota = Quota::with_period(replenish)
        .ok_or(ThrottlerError::InvalidPeriod(config.period_ms))?
        .allow_burst(limit);

    Ok(Some(Arc::new(GovernorRateLimiter::direct(quota))))
}

/// Reconfigurable throttler with overdraft semantics
pub struct JobThrottler {
    limiter: RwLock<Option<Arc<DirectLimiter>>>,
    debt: AtomicU64,
}

impl JobThrottler {
    pub fn new(config: &ThrottlerConfig) -> Result<Self> {
        Ok(Self {
            limiter: RwLock::new(build_limiter(config)?),
            debt: AtomicU64::new(0),
        })
    }

    /// A throttler that never reports overdraft
    pub fn unlimited() -> Self {
        Self {
            limiter: RwLock::new(None),
            debt: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Option<Arc<DirectLimiter>> {
        match self.limiter.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Take `count` units, booking any shortfall as debt
    pub fn acquire(&self, count: u64) {
        let Some(limiter) = self.current() else {
            return;
        };

        let mut shortfall = 0;
        for _ in 0..count {
            if limiter.check().is_err() {
                shortfall += 1;
            }
        }
        if shortfall > 0 {
            let debt = self.debt.fetch_add(shortfall, Ordering::AcqRel) + shortfall;
            debug!(shortfall, debt, "Throttler went into overdraft");
        }
    }

    /// Whether outstanding debt remains after repaying from refilled tokens
    pub fn is_overdraft(&self) -> bool {
        let Some(limiter) = self.current() else {
            return false;
        };

        loop {
            let debt = self.debt.load(Ordering::Acquire);
            if debt == 0 {
                return false;
            }
            if limiter.check().is_err() {
                return true;
            }
            // A concurrent repayment may have already cleared it
            let _ = self
                .debt
                .compare_exchange(debt, debt - 1, Ordering::AcqRel, Ordering::Acquire);
        }
    }

    pub fn debt(&self) -> u64 {
        self.debt.load(Ordering::Acquire)
    }

    pub fn is_limited(&self) -> bool {
        self.current().is_some()
    }

    /// Swap in new settings
    ///
    /// Debt carries over to the new bucket; turning throttling off forgives it.
    pub fn reconfigure(&self, config: &ThrottlerConfig) -> Result<()> {
        let limiter = build_limiter(config)?;
        if limiter.is_none() {
            self.debt.store(0, Ordering::Release);
        }

        match self.limiter.write() {
            Ok(mut guard) => *guard = limiter,
            Err(poisoned) => *poisoned.into_inner() = limiter,
        }

        debug!(limit = ?config.limit, period_ms = config.period_ms, "Throttler reconfigured");
        Ok(())
    }
}

impl std::fmt::Debug for JobThrottler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobThrottler")
            .field("limited", &self.is_limited())
            .field("debt", &self.debt())
            .finish()
    }
}
