use crate::host::TraceContext;

pub mod contention;
pub mod ctile;
pub mod reentrancy;

pub use contention::ContentionTracer;
pub use ctile::{CtileTracer, IntervalSummary, SubMetric};
pub use reentrancy::{ReentrancyCounters, ReentrancyTracer};

/// An instrumentation plug-in invoked around instrumented method calls.
///
/// Both callbacks run synchronously on the instrumented call path and must
/// stay fail-silent from the monitored application's perspective. Nothing
/// here may panic or block beyond a brief buffer mutex.
pub trait Tracer: Send + Sync {
    /// Method-entry callback.
    fn on_start(&self, ctx: &mut TraceContext);

    /// Method-exit callback.
    fn on_finish(&self, ctx: &mut TraceContext);
}
