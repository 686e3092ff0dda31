use std::sync::Mutex;

/// Append-only collection of elapsed-time samples for one measurement window.
///
/// Instrumented call sites push concurrently; the aggregation driver drains.
/// Both operations hold the mutex only for an O(1) vector operation, so the
/// hot path is never blocked behind sorting or statistics work. A poisoned
/// lock is treated as an empty window rather than propagated; nothing may
/// ever escape into the instrumented application.
#[derive(Debug, Default)]
pub struct SampleWindow {
    samples: Mutex<Vec<i32>>,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Never blocks on aggregation.
    pub fn push(&self, value: i32) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(value);
        }
    }

    /// Atomically capture the current contents and empty the window.
    ///
    /// A sample is never lost or duplicated between overlapping push/drain
    /// calls: the swap happens in a single critical section.
    pub fn drain(&self) -> Vec<i32> {
        self.samples
            .lock()
            .map(|mut samples| std::mem::take(&mut *samples))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
