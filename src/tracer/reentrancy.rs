use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::host::{MetricSink, ProbeId, TraceContext};
use crate::tracer::Tracer;

/// Shared instance counters for reentrancy diagnostics.
///
/// Held explicitly by the host binding and passed to every
/// [`ReentrancyTracer`], instead of living in ambient per-class statics.
#[derive(Debug, Default)]
pub struct ReentrancyCounters {
    instances: AtomicI64,
    per_crosscut: DashMap<String, AtomicI64>,
}

impl ReentrancyCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_instance(&self) -> i64 {
        self.instances.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_for_crosscut(&self, crosscut: &str) -> i64 {
        self.per_crosscut
            .entry(crosscut.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }
}

/// Diagnostic tracer that reports how many tracer instances the host
/// creates per crosscut, exposing the effective reentrancy configuration.
/// Start/finish callbacks only log.
pub struct ReentrancyTracer {
    crosscut: String,
}

impl ReentrancyTracer {
    pub fn new(probe: &ProbeId, sink: &dyn MetricSink, counters: &ReentrancyCounters) -> Self {
        let crosscut = probe.crosscut();
        let instance_count = counters.next_instance();
        let method_count = counters.next_for_crosscut(&crosscut);

        sink.set_counter(&format!("Reentrancy:{crosscut}"), method_count);
        sink.set_counter("Reentrancy:Instances", instance_count);
        info!(
            crosscut = %crosscut,
            instance_count, method_count, "created reentrancy test tracer"
        );

        Self { crosscut }
    }
}

impl Tracer for ReentrancyTracer {
    fn on_start(&self, ctx: &mut TraceContext) {
        let depth = ctx.enter();
        info!(crosscut = %self.crosscut, depth, "startTrace");
    }

    fn on_finish(&self, ctx: &mut TraceContext) {
        let depth = ctx.exit();
        info!(crosscut = %self.crosscut, depth, "finishTrace");
    }
}
