//! Cooperative cancellation sources polled by the interpreter loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Polled periodically by the interpreter; `Some(reason)` stops execution
/// with a fatal error carrying that reason.
pub trait Cancellation {
    fn poll(&self) -> Option<String>;
}

/// Wall-clock limit measured from construction
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }
}

impl Cancellation for Deadline {
    fn poll(&self) -> Option<String> {
        if self.start.elapsed() >= self.limit {
            Some(format!(
                "Maximum execution time of {} second{} exceeded",
                self.limit.as_secs(),
                if self.limit.as_secs() == 1 { "" } else { "s" }
            ))
        } else {
            None
        }
    }
}

/// Flag another thread can raise to stop the script
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Cancellation for CancelFlag {
    fn poll(&self) -> Option<String> {
        self.is_cancelled()
            .then(|| "Execution cancelled by host".to_string())
    }
}
