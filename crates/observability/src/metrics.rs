//! Prometheus metrics registry
//!
//! Each master owns one [`MetricsRegistry`]; components register their
//! collectors into it at bootstrap. Vectors created on demand by
//! [`PrometheusSensorBuffer`](crate::PrometheusSensorBuffer) are cached by
//! name so repeated profiling passes update the same series.

use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, SensorError};

#[derive(Default)]
pub struct MetricsRegistry {
    registry: Registry,
    gauges: Mutex<HashMap<String, (Vec<String>, GaugeVec)>>,
    counters: Mutex<HashMap<String, (Vec<String>, IntCounterVec)>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector created elsewhere
    pub fn register<C: Collector + 'static>(&self, collector: C) -> Result<()> {
        self.registry.register(Box::new(collector))?;
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gauge vector `name` with `labels`, created on first use
    pub fn gauge_vec(&self, name: &str, labels: &[&str]) -> Result<GaugeVec> {
        let mut gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((expected, vec)) = gauges.get(name) {
            check_labels(name, expected, labels)?;
            return Ok(vec.clone());
        }

        let vec = GaugeVec::new(Opts::new(name, name), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        gauges.insert(name.to_string(), (owned(labels), vec.clone()));
        Ok(vec)
    }

    /// Counter vector `name` with `labels`, created on first use
    pub fn counter_vec(&self, name: &str, labels: &[&str]) -> Result<IntCounterVec> {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((expected, vec)) = counters.get(name) {
            check_labels(name, expected, labels)?;
            return Ok(vec.clone());
        }

        let vec = IntCounterVec::new(Opts::new(name, name), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        counters.insert(name.to_string(), (owned(labels), vec.clone()));
        Ok(vec)
    }

    /// Everything registered, in Prometheus text format
    pub fn metrics_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| SensorError::Encoding(e.to_string()))
    }
}

fn owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

fn check_labels(name: &str, expected: &[String], found: &[&str]) -> Result<()> {
    if expected.iter().map(String::as_str).eq(found.iter().copied()) {
        Ok(())
    } else {
        Err(SensorError::LabelMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            found: owned(found),
        })
    }
}
