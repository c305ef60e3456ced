//! Profiling sinks
//!
//! Components describe their state by pushing tags and emitting samples:
//!
//! ```text
//! push_tag("job_type", "replicate_chunk")
//!     add_gauge("/running_job_count", 3)
//!     add_counter("/jobs_started", 17)
//! pop_tag()
//! ```
//!
//! Every sample carries the tags that are on the stack when it is emitted.

use tracing::{debug, warn};

use crate::metrics::MetricsRegistry;

pub trait SensorBuffer {
    fn push_tag(&mut self, key: &str, value: &str);

    /// # Panics
    ///
    /// Panics if there is no tag to pop.
    fn pop_tag(&mut self);

    fn add_gauge(&mut self, path: &str, value: f64);

    /// `value` is the cumulative count since start
    fn add_counter(&mut self, path: &str, value: i64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Gauge,
    Counter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: SensorKind,
    pub path: String,
    pub tags: Vec<(String, String)>,
    pub value: f64,
}

/// Keeps every sample in memory
#[derive(Debug, Default)]
pub struct RecordingSensorBuffer {
    tags: Vec<(String, String)>,
    samples: Vec<Sample>,
}

impl RecordingSensorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Value of the sample at `path` carrying exactly `tags`
    pub fn find(&self, path: &str, tags: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|sample| {
                sample.path == path
                    && sample.tags.len() == tags.len()
                    && sample
                        .tags
                        .iter()
                        .zip(tags)
                        .all(|((k, v), (ek, ev))| k == ek && v == ev)
            })
            .map(|sample| sample.value)
    }

    pub fn tag_depth(&self) -> usize {
        self.tags.len()
    }

    fn record(&mut self, kind: SensorKind, path: &str, value: f64) {
        self.samples.push(Sample {
            kind,
            path: path.to_string(),
            tags: self.tags.clone(),
            value,
        });
    }
}

impl SensorBuffer for RecordingSensorBuffer {
    fn push_tag(&mut self, key: &str, value: &str) {
        self.tags.push((key.to_string(), value.to_string()));
    }

    fn pop_tag(&mut self) {
        assert!(self.tags.pop().is_some(), "pop_tag without matching push_tag");
    }

    fn add_gauge(&mut self, path: &str, value: f64) {
        self.record(SensorKind::Gauge, path, value);
    }

    fn add_counter(&mut self, path: &str, value: i64) {
        self.record(SensorKind::Counter, path, value as f64);
    }
}

/// Writes samples into a [`MetricsRegistry`]
///
/// `/jobs_started` under prefix `cellmaster_job_tracker` becomes the series
/// `cellmaster_job_tracker_jobs_started`, labelled with the current tags.
pub struct PrometheusSensorBuffer<'a> {
    registry: &'a MetricsRegistry,
    prefix: String,
    tags: Vec<(String, String)>,
}

impl<'a> PrometheusSensorBuffer<'a> {
    pub fn new(registry: &'a MetricsRegistry, prefix: &str) -> Self {
        Self {
            registry,
            prefix: prefix.to_string(),
            tags: Vec::new(),
        }
    }

    fn metric_name(&self, path: &str) -> String {
        let suffix: String = path
            .trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", self.prefix, suffix)
    }

    fn label_names(&self) -> Vec<&str> {
        self.tags.iter().map(|(k, _)| k.as_str()).collect()
    }

    fn label_values(&self) -> Vec<&str> {
        self.tags.iter().map(|(_, v)| v.as_str()).collect()
    }
}

impl SensorBuffer for PrometheusSensorBuffer<'_> {
    fn push_tag(&mut self, key: &str, value: &str) {
        self.tags.push((key.to_string(), value.to_string()));
    }

    fn pop_tag(&mut self) {
        assert!(self.tags.pop().is_some(), "pop_tag without matching push_tag");
    }

    fn add_gauge(&mut self, path: &str, value: f64) {
        let name = self.metric_name(path);
        match self.registry.gauge_vec(&name, &self.label_names()) {
            Ok(vec) => vec.with_label_values(&self.label_values()).set(value),
            Err(e) => warn!(metric = %name, error = %e, "Failed to export gauge"),
        }
    }

    fn add_counter(&mut self, path: &str, value: i64) {
        let name = self.metric_name(path);
        let vec = match self.registry.counter_vec(&name, &self.label_names()) {
            Ok(vec) => vec,
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to export counter");
                return;
            }
        };

        let counter = vec.with_label_values(&self.label_values());
        let target = value.max(0) as u64;
        let current = counter.get();
        if target > current {
            counter.inc_by(target - current);
        } else if target < current {
            debug!(metric = %name, current, target, "Counter went backwards, ignoring");
        }
    }
}
