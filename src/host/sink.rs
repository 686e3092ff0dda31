use dashmap::{DashMap, DashSet};

/// Metric output channels, keyed by fully-qualified metric name.
///
/// The host distinguishes integer fluctuating counters, long averages and
/// string/event channels. A channel can be shut off server-side at any time;
/// tracers check before doing the corresponding computation so a disabled
/// metric costs no CPU.
pub trait MetricSink: Send + Sync {
    fn is_shut_off(&self, name: &str) -> bool;

    /// Set an integer fluctuating counter to its value for this interval.
    fn set_counter(&self, name: &str, value: i64);

    /// Record one data point into a long-average channel.
    fn record_duration(&self, name: &str, value: i64);

    /// Publish a string event.
    fn push_event(&self, name: &str, text: &str);
}

/// In-memory [`MetricSink`] with inspection accessors.
///
/// Stands in for the host's accumulator subsystem in tests and embedded
/// setups without a metric transport.
#[derive(Debug, Default)]
pub struct MemorySink {
    counters: DashMap<String, i64>,
    durations: DashMap<String, Vec<i64>>,
    events: DashMap<String, Vec<String>>,
    shut_off: DashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a channel as shut off; subsequent writes to it are dropped.
    pub fn shut_off(&self, name: &str) {
        self.shut_off.insert(name.to_string());
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).map(|v| *v)
    }

    pub fn durations(&self, name: &str) -> Vec<i64> {
        self.durations.get(name).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn events(&self, name: &str) -> Vec<String> {
        self.events.get(name).map(|v| v.clone()).unwrap_or_default()
    }

    /// Names of all channels that have received at least one write.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .counters
            .iter()
            .map(|e| e.key().clone())
            .chain(self.durations.iter().map(|e| e.key().clone()))
            .chain(self.events.iter().map(|e| e.key().clone()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl MetricSink for MemorySink {
    fn is_shut_off(&self, name: &str) -> bool {
        self.shut_off.contains(name)
    }

    fn set_counter(&self, name: &str, value: i64) {
        self.counters.insert(name.to_string(), value);
    }

    fn record_duration(&self, name: &str, value: i64) {
        self.durations.entry(name.to_string()).or_default().push(value);
    }

    fn push_event(&self, name: &str, text: &str) {
        self.events
            .entry(name.to_string())
            .or_default()
            .push(text.to_string());
    }
}
