// ── Monitored scope ──
//
// Watchdog around a single command attempt. A background task sleeps for
// the notify delay and reports the scope as stuck unless the scope is
// dropped first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

/// Dropping the scope cancels its watchdog.
pub struct MonitoredScope {
    label: &'static str,
    fired: Arc<AtomicBool>,
    _guard: DropGuard,
}

impl MonitoredScope {
    /// Enter a scope. Must be called from within a tokio runtime.
    pub fn enter(label: &'static str, message: String, notify_delay: Duration) -> Self {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let watch_token = token.clone();
        let watch_fired = Arc::clone(&fired);
        tokio::spawn(async move {
            tokio::select! {
                () = watch_token.cancelled() => {}
                () = tokio::time::sleep(notify_delay) => {
                    watch_fired.store(true, Ordering::SeqCst);
                    warn!(scope = label, delay = ?notify_delay, "{message}");
                }
            }
        });

        Self {
            label,
            fired,
            _guard: token.drop_guard(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Whether the watchdog reported this scope as stuck.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Diagnostic emitted when an attempt outlives its monitored scope.
pub(crate) fn stuck_message(command: &str) -> String {
    let thread = std::thread::current();
    format!(
        "Thread failed to exit monitored scope. thid={:?} thname={} cmd={command}",
        thread.id(),
        thread.name().unwrap_or("<unnamed>")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_when_scope_outlives_delay() {
        let scope = MonitoredScope::enter("TEST", "stuck".into(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(scope.has_fired());
        assert_eq!(scope.label(), "TEST");
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_is_cancelled_when_scope_exits() {
        let scope = MonitoredScope::enter("TEST", "stuck".into(), Duration::from_secs(5));
        let fired = Arc::clone(&scope.fired);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(scope);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
