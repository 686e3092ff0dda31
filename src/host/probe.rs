use std::collections::HashMap;
use std::time::Instant;

/// Host-identified instrumented call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeId {
    pub class_name: String,
    pub method_name: String,
    pub method_descriptor: String,
}

impl ProbeId {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        method_descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            method_descriptor: method_descriptor.into(),
        }
    }

    /// `Class-method(descriptor)` identity of the crosscut.
    pub fn crosscut(&self) -> String {
        format!(
            "{}-{}{}",
            self.class_name, self.method_name, self.method_descriptor
        )
    }
}

/// Thread wait/block counters and times captured at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentionSnapshot {
    pub wait_count: i64,
    pub block_count: i64,
    pub wait_time_ms: i64,
    pub block_time_ms: i64,
}

/// Host binding to the platform's per-thread contention counters.
pub trait ThreadStats: Send + Sync {
    /// Counters for the calling thread.
    fn snapshot(&self) -> ContentionSnapshot;

    /// Whether wait/block times (not just counts) can be collected.
    fn times_supported(&self) -> bool {
        false
    }
}

/// Per-invocation execution context, owned by the instrumented call path.
///
/// Carries everything a tracer needs between its entry and exit callbacks:
/// probe identity, naming attributes, the wall-clock start mark, reentrancy
/// depth and contention baselines keyed by depth. State that the original
/// design hid in thread-locals lives here explicitly, so the concurrency
/// contract is visible at the interface.
#[derive(Debug)]
pub struct TraceContext {
    probe: ProbeId,
    attributes: HashMap<String, String>,
    started: Option<Instant>,
    depth: i32,
    contention_baselines: HashMap<i32, ContentionSnapshot>,
}

impl TraceContext {
    pub fn new(probe: ProbeId) -> Self {
        Self {
            probe,
            attributes: HashMap::new(),
            started: None,
            depth: 0,
            contention_baselines: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn probe(&self) -> &ProbeId {
        &self.probe
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Store the wall-clock start of the current invocation.
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Elapsed wall-clock time since [`start_timer`](Self::start_timer) in
    /// ms, saturated to `i32`. 0 when the timer was never started.
    pub fn elapsed_ms(&self) -> i32 {
        self.started
            .map(|s| s.elapsed().as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(0)
    }

    /// Increment the reentrancy depth; returns the new depth.
    pub fn enter(&mut self) -> i32 {
        self.depth += 1;
        self.depth
    }

    /// Decrement the reentrancy depth; returns the new depth.
    pub fn exit(&mut self) -> i32 {
        self.depth -= 1;
        self.depth
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn reset_depth(&mut self) {
        self.depth = 0;
    }

    pub fn store_baseline(&mut self, depth: i32, snapshot: ContentionSnapshot) {
        self.contention_baselines.insert(depth, snapshot);
    }

    pub fn take_baseline(&mut self, depth: i32) -> Option<ContentionSnapshot> {
        self.contention_baselines.remove(&depth)
    }

    pub fn clear_baselines(&mut self) {
        self.contention_baselines.clear();
    }
}
