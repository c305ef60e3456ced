//! Cellmaster Core Resilience: flow-control primitives
//!
//! # Overview
//!
//! The master dispatches replication, repair and removal jobs to storage
//! nodes. Dispatch is gated by a [`JobThrottler`]: every registered job
//! acquires one unit, and the scheduling loop consults
//! [`JobThrottler::is_overdraft`] before dispatching more.
//!
//! Acquisition never blocks. When the bucket is empty the unit is recorded
//! as debt, which is repaid as the bucket refills. The throttler is `Sync`
//! so `is_overdraft` can be called from any thread.
//!
//! # Usage Example
//!
//! ```
//! use cellmaster_core_resilience::{JobThrottler, ThrottlerConfig};
//!
//! let throttler = JobThrottler::new(&ThrottlerConfig {
//!     limit: Some(2),
//!     period_ms: 60_000,
//! })
//! .unwrap();
//!
//! throttler.acquire(1);
//! throttler.acquire(1);
//! assert!(!throttler.is_overdraft());
//!
//! throttler.acquire(1);
//! assert!(throttler.is_overdraft());
//! ```

pub mod error;
pub mod throttler;

pub use error::{Result, ThrottlerError};
pub use throttler::{JobThrottler, ThrottlerConfig};
