//! GC metrics

use cellmaster_observability::MetricsRegistry;
use prometheus::{IntCounterVec, IntGauge, Opts};

/// Queue size gauge and sweep outcome counter
///
/// Created unregistered so each collector instance owns its own series;
/// bootstrap registers them with the master's registry.
#[derive(Clone, Debug)]
pub struct GcMetrics {
    pub queue_size: IntGauge,
    pub sweeps: IntCounterVec,
}

impl GcMetrics {
    pub fn new() -> Self {
        let queue_size = IntGauge::new(
            "cellmaster_gc_queue_size",
            "Number of zombie objects awaiting destruction",
        )
        .expect("Failed to create gc_queue_size metric");

        let sweeps = IntCounterVec::new(
            Opts::new(
                "cellmaster_gc_sweeps_total",
                "GC sweep mutations by commit outcome",
            ),
            &["result"],
        )
        .expect("Failed to create gc_sweeps_total metric");

        Self { queue_size, sweeps }
    }

    pub fn register(&self, registry: &MetricsRegistry) -> cellmaster_observability::Result<()> {
        registry.register(self.queue_size.clone())?;
        registry.register(self.sweeps.clone())?;
        Ok(())
    }

    pub fn record_sweep(&self, result: &str) {
        self.sweeps.with_label_values(&[result]).inc();
    }

    pub fn sweeps_with_result(&self, result: &str) -> u64 {
        self.sweeps.with_label_values(&[result]).get()
    }
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exports_series() {
        let registry = MetricsRegistry::new();
        let metrics = GcMetrics::new();
        metrics.register(&registry).unwrap();

        metrics.queue_size.set(3);
        metrics.record_sweep("committed");

        let text = registry.metrics_text().unwrap();
        assert!(text.contains("cellmaster_gc_queue_size 3"));
        assert!(text.contains("cellmaster_gc_sweeps_total{result=\"committed\"} 1"));
        assert_eq!(metrics.sweeps_with_result("committed"), 1);
        assert_eq!(metrics.sweeps_with_result("failed"), 0);
    }
}
