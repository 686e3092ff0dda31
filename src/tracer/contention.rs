use std::sync::Arc;

use tracing::{info, warn};

use crate::config::TracerParams;
use crate::error::Result;
use crate::host::{MetricSink, ThreadStats, TraceContext};
use crate::tracer::Tracer;

/// Parameter asking the tracer to collect wait/block times, not just counts.
pub const PARAM_ENABLE_TIMES: &str = "enabletimes";

/// Captures the wait and block contention experienced by a thread while it
/// executes the instrumented method.
///
/// Entry takes a baseline of the thread's wait/block counters, keyed by the
/// reentrancy depth in the [`TraceContext`]; exit publishes the deltas to
/// long-average channels. Contention times are collected only when both the
/// configuration and the platform binding allow it.
pub struct ContentionTracer {
    thread_stats: Arc<dyn ThreadStats>,
    sink: Arc<dyn MetricSink>,
    times_enabled: bool,
    wait_count_channel: String,
    block_count_channel: String,
    wait_time_channel: String,
    block_time_channel: String,
}

impl ContentionTracer {
    pub fn new(
        resource: impl Into<String>,
        params: &TracerParams,
        sink: Arc<dyn MetricSink>,
        thread_stats: Arc<dyn ThreadStats>,
    ) -> Result<Self> {
        let resource = resource.into();
        let times_enabled =
            params.get_bool(PARAM_ENABLE_TIMES, false) && thread_stats.times_supported();
        info!(resource = %resource, times_enabled, "created contention tracer");
        Ok(Self {
            thread_stats,
            sink,
            times_enabled,
            wait_count_channel: format!("{resource}:Wait Count"),
            block_count_channel: format!("{resource}:Block Count"),
            wait_time_channel: format!("{resource}:Wait Time (ms)"),
            block_time_channel: format!("{resource}:Block Time (ms)"),
        })
    }

    fn record(&self, channel: &str, delta: i64) {
        if !self.sink.is_shut_off(channel) {
            self.sink.record_duration(channel, delta);
        }
    }
}

impl Tracer for ContentionTracer {
    fn on_start(&self, ctx: &mut TraceContext) {
        let depth = ctx.enter();
        ctx.store_baseline(depth, self.thread_stats.snapshot());
    }

    fn on_finish(&self, ctx: &mut TraceContext) {
        let current = ctx.exit();
        let prior = current + 1;
        if let Some(baseline) = ctx.take_baseline(prior) {
            let now = self.thread_stats.snapshot();
            self.record(&self.wait_count_channel, now.wait_count - baseline.wait_count);
            self.record(&self.block_count_channel, now.block_count - baseline.block_count);
            if self.times_enabled {
                self.record(&self.wait_time_channel, now.wait_time_ms - baseline.wait_time_ms);
                self.record(&self.block_time_channel, now.block_time_ms - baseline.block_time_ms);
            }
        }
        if current < 1 {
            ctx.clear_baselines();
        }
        if current < 0 {
            warn!(depth = current, "reentrancy depth underrun");
            ctx.reset_depth();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ContentionSnapshot, MemorySink, ProbeId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubStats {
        current: Mutex<ContentionSnapshot>,
        times: bool,
    }

    impl StubStats {
        fn set(&self, snapshot: ContentionSnapshot) {
            *self.current.lock().unwrap() = snapshot;
        }
    }

    impl ThreadStats for StubStats {
        fn snapshot(&self) -> ContentionSnapshot {
            *self.current.lock().unwrap()
        }

        fn times_supported(&self) -> bool {
            self.times
        }
    }

    fn ctx() -> TraceContext {
        TraceContext::new(ProbeId::new("TradeService", "submit", "()V"))
    }

    #[test]
    fn publishes_count_deltas() {
        let stats = Arc::new(StubStats::default());
        let sink = Arc::new(MemorySink::new());
        let tracer = ContentionTracer::new(
            "Trades|submit",
            &TracerParams::default(),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();

        let mut ctx = ctx();
        stats.set(ContentionSnapshot { wait_count: 10, block_count: 2, ..Default::default() });
        tracer.on_start(&mut ctx);
        stats.set(ContentionSnapshot { wait_count: 14, block_count: 3, ..Default::default() });
        tracer.on_finish(&mut ctx);

        assert_eq!(sink.durations("Trades|submit:Wait Count"), vec![4]);
        assert_eq!(sink.durations("Trades|submit:Block Count"), vec![1]);
        // Times disabled without the parameter and platform support.
        assert!(sink.durations("Trades|submit:Wait Time (ms)").is_empty());
    }

    #[test]
    fn time_deltas_require_parameter_and_platform() {
        let stats = Arc::new(StubStats { times: true, ..Default::default() });
        let sink = Arc::new(MemorySink::new());
        let tracer = ContentionTracer::new(
            "Trades|submit",
            &TracerParams::new([(PARAM_ENABLE_TIMES, "true")]),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();

        let mut ctx = ctx();
        stats.set(ContentionSnapshot { wait_time_ms: 100, ..Default::default() });
        tracer.on_start(&mut ctx);
        stats.set(ContentionSnapshot { wait_time_ms: 130, ..Default::default() });
        tracer.on_finish(&mut ctx);

        assert_eq!(sink.durations("Trades|submit:Wait Time (ms)"), vec![30]);
        assert_eq!(sink.durations("Trades|submit:Block Time (ms)"), vec![0]);
    }

    #[test]
    fn nested_invocations_use_per_depth_baselines() {
        let stats = Arc::new(StubStats::default());
        let sink = Arc::new(MemorySink::new());
        let tracer = ContentionTracer::new(
            "r",
            &TracerParams::default(),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();

        let mut ctx = ctx();
        stats.set(ContentionSnapshot { wait_count: 0, ..Default::default() });
        tracer.on_start(&mut ctx); // depth 1, baseline 0
        stats.set(ContentionSnapshot { wait_count: 5, ..Default::default() });
        tracer.on_start(&mut ctx); // depth 2, baseline 5
        stats.set(ContentionSnapshot { wait_count: 7, ..Default::default() });
        tracer.on_finish(&mut ctx); // inner: 7 - 5
        tracer.on_finish(&mut ctx); // outer: 7 - 0

        assert_eq!(sink.durations("r:Wait Count"), vec![2, 7]);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn underrun_resets_depth_instead_of_going_negative() {
        let stats = Arc::new(StubStats::default());
        let sink = Arc::new(MemorySink::new());
        let tracer =
            ContentionTracer::new("r", &TracerParams::default(), sink.clone(), stats).unwrap();

        let mut ctx = ctx();
        tracer.on_finish(&mut ctx); // finish without start
        assert_eq!(ctx.depth(), 0);
        assert!(sink.durations("r:Wait Count").is_empty());
    }
}
