use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::Watcher;
use crate::event::SyncEvent;

/// Shared record of the last user activity
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last: Arc<Mutex<Instant>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn record(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }
}

/// Emits once per idle period, when inactivity crosses the threshold
pub struct IdleWatcher {
    tracker: ActivityTracker,
    threshold: Duration,
    period: Duration,
    fired: bool,
}

impl IdleWatcher {
    pub fn new(tracker: ActivityTracker, threshold: Duration, period: Duration) -> Self {
        Self {
            tracker,
            threshold,
            period,
            fired: false,
        }
    }
}

impl Watcher for IdleWatcher {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn poll(&mut self) -> Option<SyncEvent> {
        let idle = self.tracker.idle_for();
        if idle < self.threshold {
            self.fired = false;
            return None;
        }
        if self.fired {
            return None;
        }
        self.fired = true;
        Some(SyncEvent::idle(idle.as_millis() as u64))
    }
}
