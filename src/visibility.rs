//! Foreground/background state of this client instance.
//!
//! Shared by the leader coordinator (foreground fallback), the health monitor
//! (session timeout selection) and the orchestrator (which sets it).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug)]
pub struct VisibilityTracker {
    foreground: AtomicBool,
    last_changed_at: Mutex<Instant>,
}

impl VisibilityTracker {
    pub fn new(foreground: bool) -> Arc<Self> {
        Arc::new(Self {
            foreground: AtomicBool::new(foreground),
            last_changed_at: Mutex::new(Instant::now()),
        })
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    /// Record a visibility change; returns true when the value actually changed
    pub fn set_foreground(&self, foreground: bool) -> bool {
        let previous = self.foreground.swap(foreground, Ordering::AcqRel);
        if previous != foreground {
            *self.last_changed_at.lock() = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn last_changed_at(&self) -> Instant {
        *self.last_changed_at.lock()
    }
}
