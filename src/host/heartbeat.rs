use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

/// Periodic callback signature; receives the tick timestamp in epoch ms.
pub type HeartbeatFn = Arc<dyn Fn(i64) + Send + Sync>;

/// The host's heartbeat/scheduler facility.
///
/// Ticks for a single registration are serialized by the scheduler itself;
/// callbacks never observe an overlapping invocation of themselves.
pub trait Heartbeat: Send + Sync {
    fn register(&self, callback: HeartbeatFn, name: &str, period_ms: u64);
}

/// Tokio-backed [`Heartbeat`]: one spawned task per registration, driven by
/// a fixed-period interval. Missed ticks are delayed, never bunched, which
/// preserves the no-overlap guarantee callbacks rely on.
pub struct TokioHeartbeat {
    handle: tokio::runtime::Handle,
}

impl TokioHeartbeat {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Heartbeat for TokioHeartbeat {
    fn register(&self, callback: HeartbeatFn, name: &str, period_ms: u64) {
        let name = name.to_string();
        info!("[{name}] scheduled callback every {period_ms} ms");
        self.handle.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // consume immediate first tick

            loop {
                interval.tick().await;
                debug!("[{name}] heartbeat tick");
                callback(now_ms());
            }
        });
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
