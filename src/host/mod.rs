//! Fixed-contract collaborators normally provided by the host agent:
//! metric output channels, the heartbeat scheduler, name formatting, and
//! per-invocation execution context. Everything here is a trait boundary so
//! the tracers never touch the host runtime directly.

pub mod heartbeat;
pub mod name;
pub mod probe;
pub mod sink;

pub use heartbeat::{Heartbeat, TokioHeartbeat};
pub use name::{NameFormatter, TemplateNameFormatter};
pub use probe::{ContentionSnapshot, ProbeId, ThreadStats, TraceContext};
pub use sink::{MemorySink, MetricSink};
