use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::{TracerParams, PARAM_DEBUG, PARAM_SCHEDULE};
use crate::error::{Result, TracerError};
use crate::host::name::{collapse_pipes, strip_templates};
use crate::host::{Heartbeat, MetricSink, NameFormatter, TraceContext};
use crate::stats::{calc, SampleWindow};
use crate::tracer::Tracer;

/// Parameter holding the percentile to calculate (1-99).
pub const PARAM_PERCENTILE: &str = "percentile";
/// Parameter enabling the calc-performance channel.
pub const PARAM_PERFORMANCE: &str = "performance";

pub const DEFAULT_PERCENTILE: i32 = 90;
const DEFAULT_PERCENTILE_SUFFIX: &str = "Average Elapsed Time (ms)";
const AVERAGE_ELAPSED_SUFFIX: &str = ":Average Elapsed Time (ms)";
const PERFORMANCE_SUFFIX: &str = "Percentile Calc Time (ms)";
const DEBUG_SUFFIX: &str = "Interval Summary";

/// The percentile-derived output channels of one tracked metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubMetric {
    /// Threshold elapsed time at the configured percentile.
    PercentileElapsed,
    CountAtOrBelow,
    CountAbove,
    PercentAtOrBelow,
    PercentAbove,
    Mean,
    Stddev,
    Count,
}

impl SubMetric {
    pub const ALL: [SubMetric; 8] = [
        SubMetric::PercentileElapsed,
        SubMetric::CountAtOrBelow,
        SubMetric::CountAbove,
        SubMetric::PercentAtOrBelow,
        SubMetric::PercentAbove,
        SubMetric::Mean,
        SubMetric::Stddev,
        SubMetric::Count,
    ];

    /// Tracer parameter that carries this channel's name suffix.
    pub fn param_key(self) -> &'static str {
        match self {
            SubMetric::PercentileElapsed => "percentileelapsed",
            SubMetric::CountAtOrBelow => "countltoe",
            SubMetric::CountAbove => "countgt",
            SubMetric::PercentAtOrBelow => "percentltoe",
            SubMetric::PercentAbove => "percentgt",
            SubMetric::Mean => "mean",
            SubMetric::Stddev => "stddev",
            SubMetric::Count => "count",
        }
    }

    /// Whether the channel needs the sorted-window percentile threshold.
    fn needs_threshold(self) -> bool {
        matches!(
            self,
            SubMetric::PercentileElapsed
                | SubMetric::CountAtOrBelow
                | SubMetric::CountAbove
                | SubMetric::PercentAtOrBelow
                | SubMetric::PercentAbove
        )
    }
}

/// Statistics computed for one closed window; values are present only for
/// channels that were enabled on that tick. Discarded after publishing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntervalSummary {
    pub count: i32,
    pub percentile: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_or_below: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_at_or_below: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_above: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stddev: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calc_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// CtileSlot: dual-buffer state for one tracked metric key
// ---------------------------------------------------------------------------

/// Two sample windows plus a reference to the tracer-wide alternator flag.
///
/// The window selected by the flag is "closed" (drained on the next tick);
/// the other is "live" and receives new samples. All slots under one tracer
/// share the flag, so every slot flips in lock-step. A push racing the flip
/// may land on either side of the window boundary; that approximation is
/// accepted.
pub struct CtileSlot {
    windows: [SampleWindow; 2],
    alternator: Arc<AtomicBool>,
    percentile: i32,
    channels: HashMap<SubMetric, String>,
    performance_channel: Option<String>,
    debug_channel: Option<String>,
}

impl CtileSlot {
    fn new(
        alternator: Arc<AtomicBool>,
        percentile: i32,
        channels: HashMap<SubMetric, String>,
        performance_channel: Option<String>,
        debug_channel: Option<String>,
    ) -> Self {
        Self {
            windows: [SampleWindow::new(), SampleWindow::new()],
            alternator,
            percentile,
            channels,
            performance_channel,
            debug_channel,
        }
    }

    fn selected(&self) -> usize {
        self.alternator.load(Ordering::Acquire) as usize
    }

    /// The window currently receiving samples: the one NOT selected by the
    /// alternator flag.
    pub fn live(&self) -> &SampleWindow {
        &self.windows[1 - self.selected()]
    }

    /// The window selected by the alternator flag, pending drain.
    pub fn closed(&self) -> &SampleWindow {
        &self.windows[self.selected()]
    }

    /// Hot path: append an elapsed time to the live window.
    pub fn record(&self, elapsed_ms: i32) {
        self.live().push(elapsed_ms);
    }

    /// Drain the closed window, compute the enabled statistics and publish
    /// them. Returns `None` for an underrun window (fewer than 2 samples):
    /// the buffer is still reset but nothing is computed or published.
    pub fn calc_and_publish(&self, sink: &dyn MetricSink) -> Result<Option<IntervalSummary>> {
        let samples = self.closed().drain();
        if samples.len() < 2 {
            return Ok(None);
        }
        let started = Instant::now();
        let n = samples.len() as i32;

        // Shut-off is checked before the corresponding computation so a
        // disabled channel costs nothing.
        let channel = |sub: SubMetric| {
            self.channels
                .get(&sub)
                .filter(|name| !sink.is_shut_off(name.as_str()))
        };

        let mut summary = IntervalSummary {
            count: n,
            percentile: self.percentile,
            ..Default::default()
        };

        if SubMetric::ALL
            .iter()
            .any(|&s| s.needs_threshold() && channel(s).is_some())
        {
            // Sorted at most once per window, however many percentile-derived
            // channels are live.
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let threshold = calc::percentile_rank_value(&sorted, self.percentile);
            let (at_or_below, above) = calc::partition_at(&samples, threshold);

            if let Some(name) = channel(SubMetric::PercentileElapsed) {
                sink.set_counter(name, threshold.into());
                summary.threshold = Some(threshold);
            }
            if let Some(name) = channel(SubMetric::CountAtOrBelow) {
                sink.set_counter(name, at_or_below.into());
                summary.at_or_below = Some(at_or_below);
            }
            if let Some(name) = channel(SubMetric::CountAbove) {
                sink.set_counter(name, above.into());
                summary.above = Some(above);
            }
            if let Some(name) = channel(SubMetric::PercentAtOrBelow) {
                let pct = calc::ipercent(at_or_below.into(), n.into());
                sink.set_counter(name, pct.into());
                summary.percent_at_or_below = Some(pct);
            }
            if let Some(name) = channel(SubMetric::PercentAbove) {
                let pct = calc::ipercent(above.into(), n.into());
                sink.set_counter(name, pct.into());
                summary.percent_above = Some(pct);
            }
        }

        if channel(SubMetric::Mean).is_some() || channel(SubMetric::Stddev).is_some() {
            let mean = calc::mean(&samples);
            if let Some(name) = channel(SubMetric::Mean) {
                sink.set_counter(name, mean.into());
                summary.mean = Some(mean);
            }
            if let Some(name) = channel(SubMetric::Stddev) {
                let sd = calc::stddev(&samples);
                sink.set_counter(name, sd.into());
                summary.stddev = Some(sd);
            }
        }

        if let Some(name) = channel(SubMetric::Count) {
            sink.set_counter(name, n.into());
        }

        if let Some(name) = &self.performance_channel {
            if !sink.is_shut_off(name) {
                let calc_ms = started.elapsed().as_millis() as i64;
                sink.record_duration(name, calc_ms);
                summary.calc_ms = Some(calc_ms);
            }
        }

        if let Some(name) = &self.debug_channel {
            if !sink.is_shut_off(name) {
                sink.push_event(name, &serde_json::to_string(&summary)?);
            }
        }

        Ok(Some(summary))
    }
}

// ---------------------------------------------------------------------------
// CtileTracer
// ---------------------------------------------------------------------------

/// Percentile ("Ctile") windowing tracer.
///
/// Method completions append elapsed times to per-metric-key dual buffers;
/// a periodic heartbeat callback flips the shared alternator and publishes
/// order statistics over each just-closed window:
///
/// - the threshold elapsed time of the nth percentile,
/// - counts and percentages of transactions at-or-below / above it,
/// - mean, standard deviation and sample count.
pub struct CtileTracer {
    resource: String,
    percentile: i32,
    schedule_ms: i64,
    trace_performance: bool,
    debug: bool,
    suffixes: HashMap<SubMetric, String>,
    alternator: Arc<AtomicBool>,
    slots: DashMap<String, Arc<CtileSlot>>,
    formatter: Arc<dyn NameFormatter>,
    sink: Arc<dyn MetricSink>,
}

impl std::fmt::Debug for CtileTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtileTracer")
            .field("resource", &self.resource)
            .field("percentile", &self.percentile)
            .field("schedule_ms", &self.schedule_ms)
            .field("trace_performance", &self.trace_performance)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl CtileTracer {
    /// Builds a tracer from its host parameters. Fails fast on a malformed
    /// or out-of-range percentile so a broken probe is disabled instead of
    /// publishing garbage.
    pub fn new(
        resource: impl Into<String>,
        params: &TracerParams,
        sink: Arc<dyn MetricSink>,
        formatter: Arc<dyn NameFormatter>,
    ) -> Result<Self> {
        let resource = resource.into();
        let percentile = params.get_i32(PARAM_PERCENTILE, DEFAULT_PERCENTILE)?;
        if !(1..=99).contains(&percentile) {
            return Err(TracerError::Config(format!(
                "percentile must be in 1..=99, got {percentile}"
            )));
        }
        let schedule_ms = params.get_i64(PARAM_SCHEDULE, -1)?;

        let mut suffixes = HashMap::new();
        suffixes.insert(
            SubMetric::PercentileElapsed,
            params.get_str(
                SubMetric::PercentileElapsed.param_key(),
                DEFAULT_PERCENTILE_SUFFIX,
            ),
        );
        // Optional channels exist only when the host configured a suffix.
        for sub in SubMetric::ALL {
            if sub == SubMetric::PercentileElapsed {
                continue;
            }
            if let Some(suffix) = params.get(sub.param_key()) {
                suffixes.insert(sub, suffix.to_string());
            }
        }

        info!(resource = %resource, percentile, schedule_ms, "created percentile tracer");

        Ok(Self {
            resource,
            percentile,
            schedule_ms,
            trace_performance: params.get_bool(PARAM_PERFORMANCE, false),
            debug: params.get_bool(PARAM_DEBUG, false),
            suffixes,
            alternator: Arc::new(AtomicBool::new(false)),
            slots: DashMap::new(),
            formatter,
            sink,
        })
    }

    pub fn percentile(&self) -> i32 {
        self.percentile
    }

    pub fn schedule_ms(&self) -> i64 {
        self.schedule_ms
    }

    /// Registers the aggregation driver with the heartbeat when a schedule
    /// period was configured.
    pub fn register(self: &Arc<Self>, heartbeat: &dyn Heartbeat) {
        if self.schedule_ms <= 0 {
            return;
        }
        let tracer = Arc::clone(self);
        heartbeat.register(
            Arc::new(move |_ts| tracer.run_interval()),
            "percentile-tracer",
            self.schedule_ms as u64,
        );
    }

    /// Hot-path recording entry: appends one elapsed time under the given
    /// formatted metric name, creating the slot on first observation.
    pub fn record(&self, key: &str, elapsed_ms: i32) {
        self.slot(key).record(elapsed_ms);
    }

    /// One aggregation tick: flip the shared alternator once, then drain,
    /// calculate and publish every registered slot. A failing key is logged
    /// and skipped; it never aborts the tick for the others.
    pub fn run_interval(&self) {
        // Flip before any slot is drained: writers arriving during the flip
        // are routed to the new live window, never the one being drained.
        self.alternator.fetch_xor(true, Ordering::AcqRel);

        // Snapshot the registry before doing any statistics work. Holding a
        // registry shard lock across sort/publish would stall a hot-path
        // thread creating its first slot in that shard.
        let slots: Vec<(String, Arc<CtileSlot>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut published = 0usize;
        for (key, slot) in &slots {
            debug!(key = %key, "interval percentile calculation");
            match slot.calc_and_publish(self.sink.as_ref()) {
                Ok(Some(_)) => published += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(key = %key, "interval percentile calculation failed: {e}");
                }
            }
        }
        debug!(slots = slots.len(), published, "interval complete");
    }

    fn slot(&self, key: &str) -> Arc<CtileSlot> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(&slot);
        }
        // entry() is an atomic get-or-insert: concurrent first observations
        // of one key converge on a single slot.
        Arc::clone(&self.slots.entry(key.to_string()).or_insert_with(|| {
            debug!(key, "creating percentile slot");
            let base = ctile_resource_name(key, self.percentile);
            let channels = self
                .suffixes
                .iter()
                .map(|(&sub, suffix)| (sub, format!("{base}{suffix}")))
                .collect();
            let performance_channel = self
                .trace_performance
                .then(|| format!("{base}{PERFORMANCE_SUFFIX}"));
            let debug_channel = self.debug.then(|| format!("{base}{DEBUG_SUFFIX}"));
            Arc::new(CtileSlot::new(
                Arc::clone(&self.alternator),
                self.percentile,
                channels,
                performance_channel,
                debug_channel,
            ))
        }))
    }
}

impl Tracer for CtileTracer {
    fn on_start(&self, ctx: &mut TraceContext) {
        ctx.start_timer();
    }

    fn on_finish(&self, ctx: &mut TraceContext) {
        let elapsed = ctx.elapsed_ms();
        let key = self.formatter.format(&self.resource, ctx);

        // Raw per-invocation pass-through alongside the windowed statistics.
        let average = format!("{key}{AVERAGE_ELAPSED_SUFFIX}");
        if !self.sink.is_shut_off(&average) {
            self.sink.record_duration(&average, elapsed.into());
        }

        self.record(&key, elapsed);
    }
}

/// Summary resource for a metric key: template segments removed, pipe runs
/// collapsed, `|Percentile <p>:` appended.
fn ctile_resource_name(resource: &str, percentile: i32) -> String {
    let cleaned = collapse_pipes(&strip_templates(resource));
    format!("{cleaned}|Percentile {percentile}:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemorySink, ProbeId, TemplateNameFormatter};

    fn slot(percentile: i32, channels: &[(SubMetric, &str)]) -> CtileSlot {
        CtileSlot::new(
            Arc::new(AtomicBool::new(false)),
            percentile,
            channels
                .iter()
                .map(|(sub, name)| (*sub, name.to_string()))
                .collect(),
            None,
            None,
        )
    }

    fn tracer(params: &TracerParams, sink: Arc<MemorySink>) -> CtileTracer {
        CtileTracer::new(
            "Trades|{session}|submit",
            params,
            sink,
            Arc::new(TemplateNameFormatter),
        )
        .unwrap()
    }

    fn full_params() -> TracerParams {
        TracerParams::new([
            ("percentile", "50"),
            ("countltoe", "Count At Or Below"),
            ("countgt", "Count Above"),
            ("percentltoe", "Percent At Or Below"),
            ("percentgt", "Percent Above"),
            ("mean", "Mean (ms)"),
            ("stddev", "StdDev (ms)"),
            ("count", "Count"),
        ])
    }

    #[test]
    fn flip_swaps_live_and_closed() {
        let s = slot(90, &[]);
        s.record(42);
        assert_eq!(s.live().len(), 1);
        assert!(s.closed().is_empty());

        s.alternator.fetch_xor(true, Ordering::AcqRel);
        assert!(s.live().is_empty());
        assert_eq!(s.closed().drain(), vec![42]);
    }

    #[test]
    fn underrun_window_resets_without_publishing() {
        let sink = MemorySink::new();
        let s = slot(50, &[(SubMetric::Count, "x:Count")]);
        s.closed().push(5);

        let result = s.calc_and_publish(&sink).unwrap();
        assert!(result.is_none());
        assert!(s.closed().is_empty());
        assert!(sink.channel_names().is_empty());
    }

    #[test]
    fn publishes_full_window_statistics() {
        let sink = Arc::new(MemorySink::new());
        let t = tracer(&full_params(), Arc::clone(&sink));
        for v in [3, 7, 7, 19] {
            t.record("Trades|primary|submit", v);
        }
        t.run_interval();

        let base = "Trades|primary|submit|Percentile 50:";
        assert_eq!(sink.counter(&format!("{base}Average Elapsed Time (ms)")), Some(7));
        assert_eq!(sink.counter(&format!("{base}Count At Or Below")), Some(3));
        assert_eq!(sink.counter(&format!("{base}Count Above")), Some(1));
        assert_eq!(sink.counter(&format!("{base}Percent At Or Below")), Some(75));
        assert_eq!(sink.counter(&format!("{base}Percent Above")), Some(25));
        assert_eq!(sink.counter(&format!("{base}Mean (ms)")), Some(9));
        assert_eq!(sink.counter(&format!("{base}StdDev (ms)")), Some(6));
        assert_eq!(sink.counter(&format!("{base}Count")), Some(4));
    }

    #[test]
    fn second_interval_without_samples_publishes_nothing_new() {
        let sink = Arc::new(MemorySink::new());
        let t = tracer(&full_params(), Arc::clone(&sink));
        for v in [3, 7, 7, 19] {
            t.record("k", v);
        }
        t.run_interval();
        let first = sink.counter("k|Percentile 50:Count");
        assert_eq!(first, Some(4));

        // Both windows are now empty; the next tick drains an empty window.
        t.run_interval();
        assert_eq!(sink.counter("k|Percentile 50:Count"), Some(4));
    }

    #[test]
    fn shut_off_channel_is_skipped() {
        let sink = Arc::new(MemorySink::new());
        let t = tracer(&full_params(), Arc::clone(&sink));
        sink.shut_off("k|Percentile 50:Mean (ms)");
        for v in [3, 7, 7, 19] {
            t.record("k", v);
        }
        t.run_interval();

        assert_eq!(sink.counter("k|Percentile 50:Mean (ms)"), None);
        // Stddev is independent of the mean channel being shut off.
        assert_eq!(sink.counter("k|Percentile 50:StdDev (ms)"), Some(6));
    }

    #[test]
    fn recording_new_keys_is_not_blocked_by_a_publishing_tick() {
        use std::sync::mpsc;
        use std::sync::Mutex;
        use std::time::Duration;

        // Sink whose first counter write parks until released, holding one
        // tick mid-publish.
        struct GatedSink {
            inner: MemorySink,
            entered: mpsc::Sender<()>,
            release: Mutex<mpsc::Receiver<()>>,
            gated: AtomicBool,
        }

        impl MetricSink for GatedSink {
            fn is_shut_off(&self, name: &str) -> bool {
                self.inner.is_shut_off(name)
            }

            fn set_counter(&self, name: &str, value: i64) {
                if self.gated.swap(false, Ordering::SeqCst) {
                    self.entered.send(()).unwrap();
                    self.release.lock().unwrap().recv().unwrap();
                }
                self.inner.set_counter(name, value);
            }

            fn record_duration(&self, name: &str, value: i64) {
                self.inner.record_duration(name, value);
            }

            fn push_event(&self, name: &str, text: &str) {
                self.inner.push_event(name, text);
            }
        }

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(GatedSink {
            inner: MemorySink::new(),
            entered: entered_tx,
            release: Mutex::new(release_rx),
            gated: AtomicBool::new(true),
        });
        let t = Arc::new(
            CtileTracer::new("r", &full_params(), sink, Arc::new(TemplateNameFormatter))
                .unwrap(),
        );
        for v in [3, 7] {
            t.record("warm", v);
        }

        let ticker = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || t.run_interval())
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Mid-publish: first observations of fresh keys must create their
        // slots without waiting for the statistics work to finish.
        for i in 0..64 {
            t.record(&format!("k{i}"), 1);
        }
        assert_eq!(t.slots.len(), 65);

        release_tx.send(()).unwrap();
        ticker.join().unwrap();
    }

    #[test]
    fn concurrent_first_observation_creates_one_slot() {
        let sink = Arc::new(MemorySink::new());
        let t = Arc::new(tracer(&full_params(), sink.clone()));

        let threads: Vec<_> = (1..=16)
            .map(|v| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || t.record("shared", v))
            })
            .collect();
        for th in threads {
            th.join().unwrap();
        }

        assert_eq!(t.slots.len(), 1);
        t.run_interval();
        assert_eq!(sink.counter("shared|Percentile 50:Count"), Some(16));
    }

    #[test]
    fn on_finish_formats_key_and_records_pass_through() {
        let sink = Arc::new(MemorySink::new());
        let params = TracerParams::new([("percentile", "90"), ("count", "Count")]);
        let t = tracer(&params, Arc::clone(&sink));

        let mut ctx = TraceContext::new(ProbeId::new("TradeService", "submit", "()V"))
            .with_attribute("session", "primary");
        for _ in 0..2 {
            t.on_start(&mut ctx);
            t.on_finish(&mut ctx);
        }

        assert_eq!(
            sink.durations("Trades|primary|submit:Average Elapsed Time (ms)").len(),
            2
        );
        t.run_interval();
        assert_eq!(sink.counter("Trades|primary|submit|Percentile 90:Count"), Some(2));
    }

    #[test]
    fn debug_channel_publishes_a_json_summary() {
        let sink = Arc::new(MemorySink::new());
        let mut pairs: Vec<(&str, &str)> = vec![("debug", "true"), ("percentile", "50")];
        pairs.push(("mean", "Mean (ms)"));
        let t = tracer(&TracerParams::new(pairs), Arc::clone(&sink));
        for v in [3, 7, 7, 19] {
            t.record("k", v);
        }
        t.run_interval();

        let events = sink.events("k|Percentile 50:Interval Summary");
        assert_eq!(events.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(parsed["count"], 4);
        assert_eq!(parsed["mean"], 9);
    }

    #[test]
    fn percentile_out_of_range_fails_construction() {
        let err = CtileTracer::new(
            "r",
            &TracerParams::new([("percentile", "120")]),
            Arc::new(MemorySink::new()),
            Arc::new(TemplateNameFormatter),
        )
        .unwrap_err();
        assert!(err.to_string().contains("percentile"));
    }

    #[test]
    fn summary_resource_strips_templates() {
        assert_eq!(
            ctile_resource_name("Trades|{session}|submit", 90),
            "Trades|submit|Percentile 90:"
        );
        assert_eq!(ctile_resource_name("plain", 50), "plain|Percentile 50:");
    }
}
