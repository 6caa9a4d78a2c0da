use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

/// What the sweeper needs from the cache it serves.
pub(crate) trait SweepTarget: Send + Sync + 'static {
    /// Remove expired entries. Returns the number of removed ones.
    fn sweep_expired(&self) -> usize;
    /// Whether there are entries that can expire.
    fn has_expiring(&self) -> bool;
    fn name(&self) -> String;
}

#[derive(Debug, Default)]
struct SweeperState {
    task:    Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// Background task purging expired entries every `interval`.
///
/// The task is started on demand and retires itself when nothing in the cache can expire or the cache is gone. Once
/// [`stop`](Self::stop)ped, it never starts again.
#[derive(Debug)]
pub(crate) struct Sweeper {
    interval: Duration,
    state:    Arc<SweeperState>,
}

impl Sweeper {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Arc::new(SweeperState::default()),
        }
    }

    pub(crate) fn ensure_running<T: SweepTarget>(&self, target: Weak<T>) {
        if self.is_stopped() {
            return;
        }

        let mut task = self.state.task.lock();
        if task.as_ref().is_none_or(|t| t.is_finished()) {
            // Without a runtime we fall back to lazy expiry on read.
            let Ok(rt) = Handle::try_current()
            else {
                trace!("No tokio runtime, expiry sweeper not started");
                return;
            };
            let state = Arc::clone(&self.state);
            *task = Some(rt.spawn(Self::run(target, state, self.interval)));
        }
    }

    async fn run<T: SweepTarget>(target: Weak<T>, state: Arc<SweeperState>, interval: Duration) {
        if let Some(target) = target.upgrade() {
            debug!(cache = %target.name(), ?interval, "Starting expiry sweeper");
        }

        loop {
            tokio::time::sleep(interval).await;

            if state.stopped.load(Ordering::Acquire) {
                break;
            }

            let Some(target) = target.upgrade()
            else {
                break;
            };

            let removed = target.sweep_expired();
            trace!(cache = %target.name(), removed, "Expiry sweep done");

            // Decide on retirement under the task lock so that a concurrent `ensure_running` either sees a live task
            // or finds the slot empty and spawns a new one.
            let mut task = state.task.lock();
            if !target.has_expiring() {
                debug!(cache = %target.name(), "Stopping expiry sweeper since no entry can expire");
                task.take();
                break;
            }
        }
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state
            .task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Returns `false` if the sweeper has been stopped already.
    pub(crate) fn stop(&self) -> bool {
        if self.state.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(task) = self.state.task.lock().take() {
            task.abort();
        }
        true
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.state.task.lock().take() {
            task.abort();
        }
    }
}
