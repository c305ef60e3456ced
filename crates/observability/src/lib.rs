//! Cellmaster observability
//!
//! Two pieces:
//!
//! - [`MetricsRegistry`]: a per-master Prometheus registry. Long-lived
//!   collectors (the GC queue gauge, sweep counters) are registered once;
//!   profiling series are created on demand.
//! - [`SensorBuffer`]: the sink that components write profiling samples
//!   into. [`RecordingSensorBuffer`] keeps them in memory and
//!   [`PrometheusSensorBuffer`] forwards them to a registry.
//!
//! ## Quick Start
//!
//! ```
//! use cellmaster_observability::{MetricsRegistry, PrometheusSensorBuffer, SensorBuffer};
//!
//! let registry = MetricsRegistry::new();
//! let mut buffer = PrometheusSensorBuffer::new(&registry, "cellmaster_job_tracker");
//!
//! buffer.push_tag("job_type", "replicate_chunk");
//! buffer.add_gauge("/running_job_count", 3.0);
//! buffer.pop_tag();
//!
//! assert!(registry
//!     .metrics_text()
//!     .unwrap()
//!     .contains("cellmaster_job_tracker_running_job_count"));
//! ```

pub mod error;
pub mod metrics;
pub mod sensor;

pub use error::{Result, SensorError};
pub use metrics::MetricsRegistry;
pub use sensor::{
    PrometheusSensorBuffer, RecordingSensorBuffer, Sample, SensorBuffer, SensorKind,
};
