//! User-visible notices.
//!
//! The orchestrator never waits on a notice and never sees a notice fail:
//! `Notifier::emit` is fire-and-forget. Hosts decide how notices surface
//! (toast, tray balloon, log line).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::types::Severity;

pub trait Notifier: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn emit(&self, severity: Severity, message: &str) {
        (**self).emit(severity, message)
    }
}

/// Renders notices as log lines. The default for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => tracing::error!(notice = %severity, "{message}"),
            Severity::Info | Severity::Success => {
                tracing::info!(notice = %severity, "{message}")
            }
        }
    }
}

/// Drops a notice when the identical `(severity, message)` pair was already
/// emitted within `window`.
pub struct DedupNotifier<N> {
    inner: N,
    window: Duration,
    recent: Mutex<HashMap<(Severity, String), Instant>>,
}

impl<N: Notifier> DedupNotifier<N> {
    pub fn new(inner: N, window: Duration) -> Self {
        Self {
            inner,
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the notice should be shown, recording it if so.
    fn admit(&self, severity: Severity, message: &str) -> bool {
        let now = Instant::now();
        let Ok(mut recent) = self.recent.lock() else {
            return true;
        };
        recent.retain(|_, shown| now.duration_since(*shown) < self.window);
        let key = (severity, message.to_string());
        if recent.contains_key(&key) {
            tracing::debug!(notice = %severity, "suppressed duplicate notice: {message}");
            return false;
        }
        recent.insert(key, now);
        true
    }
}

impl<N: Notifier> Notifier for DedupNotifier<N> {
    fn emit(&self, severity: Severity, message: &str) {
        if self.admit(severity, message) {
            self.inner.emit(severity, message);
        }
    }
}
