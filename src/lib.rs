//! Instrumentation tracers for an in-process APM agent.
//!
//! Each tracer hooks method entry/exit callbacks delivered by the host's
//! instrumentation runtime and turns elapsed times and thread-contention
//! counters into named metrics. The centerpiece is the percentile ("Ctile")
//! tracer: a per-metric dual-buffer windowing sampler whose heartbeat tick
//! flips a shared alternator, drains each just-closed window and publishes
//! order statistics over it without ever blocking the hot path.
//!
//! The host runtime itself (probe injection, metric transport, storage)
//! stays behind the trait boundaries in [`host`].

pub mod config;
pub mod error;
pub mod host;
pub mod stats;
pub mod tracer;

pub use config::TracerParams;
pub use error::{Result, TracerError};
pub use host::{
    Heartbeat, MemorySink, MetricSink, NameFormatter, ProbeId, TemplateNameFormatter,
    ThreadStats, TokioHeartbeat, TraceContext,
};
pub use tracer::{ContentionTracer, CtileTracer, ReentrancyTracer, Tracer};
