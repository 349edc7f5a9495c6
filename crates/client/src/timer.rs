//! Repeating background timers.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// Longest period a timer is armed with. Keeps deadlines representable.
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A repeating timer running as a runtime task.
///
/// The first tick fires one full period after arming. The tick callback is
/// synchronous: anything that needs the network is spawned from it, so the
/// cadence never depends on how long a previous tick's work takes.
///
/// Dropping the handle aborts the task.
pub(crate) struct TimerHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn a timer firing every `period` until `on_tick` breaks or the
    /// handle is cancelled.
    pub(crate) fn spawn<F>(name: &'static str, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let period = period.min(MAX_PERIOD);
        // Anchored at arming, not at the task's first poll.
        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!(timer = name, "Timer tick");
                if on_tick().is_break() {
                    trace!(timer = name, "Timer stopped itself");
                    break;
                }
            }
        });

        trace!(timer = name, ?period, "Timer armed");
        Self { name, handle }
    }

    /// Stop the timer. A tick already handed off keeps running.
    pub(crate) fn cancel(self) {
        trace!(timer = self.name, "Timer cancelled");
        // Drop aborts.
    }

    /// Whether the timer task has ended.
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
