use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A progress tick emitted while scanning or deleting
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Entries processed so far in the current phase
    pub processed_count: usize,
    /// Path being processed when the event fired
    pub current_path: PathBuf,
    /// Time since the phase started
    pub elapsed: Duration,
}

/// Receiver for progress events.
///
/// Called from worker threads, so implementations must be cheap and thread-safe.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Sink that drops every event
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Cooperative cancellation flag shared between a caller and a running deletion
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that work stops at the next poll point
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
