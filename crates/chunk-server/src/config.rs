//! Dynamic chunk manager settings
//!
//! These are part of the dynamic cluster config and may change at runtime.
//! The job tracker re-reads them on every config change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use cellmaster_core_resilience::ThrottlerConfig;

use crate::error::{ChunkServerError, Result};

/// Capacity matrix keyed by data center name; `None` is the null data center
pub type CapacitiesByName = HashMap<Option<String>, HashMap<Option<String>, i64>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicChunkManagerConfig {
    /// Running and waiting jobs older than this are aborted
    #[serde(default = "default_job_timeout_s")]
    pub job_timeout_s: u64,

    #[serde(default)]
    pub job_throttler: ThrottlerConfig,

    #[serde(default)]
    pub inter_dc_limits: InterDcLimitsConfig,
}

fn default_job_timeout_s() -> u64 {
    300
}

impl Default for DynamicChunkManagerConfig {
    fn default() -> Self {
        Self {
            job_timeout_s: default_job_timeout_s(),
            job_throttler: ThrottlerConfig::default(),
            inter_dc_limits: InterDcLimitsConfig::default(),
        }
    }
}

impl DynamicChunkManagerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_s)
    }

    pub fn validate(&self) -> Result<()> {
        self.job_throttler.validate()?;
        self.inter_dc_limits.validate()
    }
}

/// One explicit edge capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterDcCapacity {
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub destination: Option<String>,

    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterDcLimitsConfig {
    /// Capacity of every edge without an explicit entry, before being split
    /// across secondary cells
    #[serde(default = "default_capacity")]
    pub default_capacity: i64,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default)]
    pub capacities: Vec<InterDcCapacity>,
}

fn default_capacity() -> i64 {
    i64::MAX
}

fn default_update_interval_ms() -> u64 {
    1000
}

impl Default for InterDcLimitsConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
            update_interval_ms: default_update_interval_ms(),
            capacities: Vec::new(),
        }
    }
}

impl InterDcLimitsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Explicit capacities as a nested map; later entries win
    pub fn capacities_by_name(&self) -> CapacitiesByName {
        let mut result = CapacitiesByName::new();
        for entry in &self.capacities {
            result
                .entry(entry.source.clone())
                .or_default()
                .insert(entry.destination.clone(), entry.capacity);
        }
        result
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_capacity < 0 {
            return Err(ChunkServerError::NegativeCapacity {
                source_dc: None,
                destination_dc: None,
                capacity: self.default_capacity,
            });
        }

        if let Some(entry) = self.capacities.iter().find(|entry| entry.capacity < 0) {
            return Err(ChunkServerError::NegativeCapacity {
                source_dc: entry.source.clone(),
                destination_dc: entry.destination.clone(),
                capacity: entry.capacity,
            });
        }

        Ok(())
    }
}
