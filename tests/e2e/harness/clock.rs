use insight_core::TimeProvider;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Controllable time for timestamp-dependent testing.
///
/// Passed to `InsightProject::with_time_provider()` so metric timestamps
/// become deterministic.
#[derive(Clone)]
pub struct MockClock {
    current: Arc<AtomicI64>,
}

impl MockClock {
    /// Create a new mock clock starting at the given epoch seconds.
    pub fn at(epoch_secs: i64) -> Self {
        Self {
            current: Arc::new(AtomicI64::new(epoch_secs)),
        }
    }

    /// Create a new mock clock starting at current time.
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        Self::at(now)
    }

    /// Creates a time provider suitable for passing to InsightProject.
    pub fn as_provider(&self) -> Arc<dyn TimeProvider> {
        let current = self.current.clone();
        Arc::new(move || current.load(Ordering::SeqCst))
    }

    /// Get current timestamp.
    pub fn now(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Advance time by duration.
    pub fn advance(&self, duration: Duration) {
        self.current
            .fetch_add(duration.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
