//! Object manager settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectManagerConfig {
    /// Interval between regular GC sweeps
    #[serde(default = "default_gc_sweep_period_ms")]
    pub gc_sweep_period_ms: u64,

    /// Upper bound on ids destroyed by one sweep mutation
    #[serde(default = "default_max_objects_per_gc_sweep")]
    pub max_objects_per_gc_sweep: usize,
}

fn default_gc_sweep_period_ms() -> u64 {
    1000
}

fn default_max_objects_per_gc_sweep() -> usize {
    1000
}

impl Default for ObjectManagerConfig {
    fn default() -> Self {
        Self {
            gc_sweep_period_ms: default_gc_sweep_period_ms(),
            max_objects_per_gc_sweep: default_max_objects_per_gc_sweep(),
        }
    }
}

impl ObjectManagerConfig {
    pub fn gc_sweep_period(&self) -> Duration {
        Duration::from_millis(self.gc_sweep_period_ms)
    }
}
