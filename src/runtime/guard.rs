//! Call-site helpers for UI-bound triggers: a re-entrancy flag and a
//! quiet-period debouncer.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Quiet period applied to high-frequency sources such as text `onChange`.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// "Already running" flag of one trigger call site.
#[derive(Debug, Clone, Default)]
pub struct TriggerGuard {
    busy: Arc<AtomicBool>,
}

impl TriggerGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the call site busy, or `None` if it already is. The flag is
    /// released when the token drops.
    pub fn try_acquire(&self) -> Option<GuardToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardToken {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct GuardToken {
    busy: Arc<AtomicBool>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Coalesces bursts of calls into one, run after `quiet` has elapsed since
/// the last call.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Mutex::new(None),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Schedule `f`, superseding any call still waiting out its quiet period.
    /// The handle resolves to `true` if `f` ran.
    pub fn call<F, Fut>(&self, f: F) -> JoinHandle<bool>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            trace!(target: "uiflow::runtime", "Superseding pending debounced call");
            previous.cancel();
        }
        let quiet = self.quiet;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(quiet) => {
                    f().await;
                    true
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_guard_is_exclusive_until_dropped() {
        let guard = TriggerGuard::new();
        let token = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert!(guard.clone().try_acquire().is_none());
        drop(token);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_debouncer_runs_last_call_only() {
        let debouncer = Debouncer::new(Duration::from_millis(40));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let runs = runs.clone();
            handles.push(debouncer.call(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let mut ran = Vec::new();
        for h in handles {
            ran.push(h.await.unwrap());
        }
        assert_eq!(ran, vec![false, false, true]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_quiet_period() {
        assert_eq!(Debouncer::default().quiet(), Duration::from_millis(300));
    }
}
