//! Idle monitor: releases the lease once the caller stops reporting activity.

use crate::manager::{LeaseManager, LeaseState};
use crate::timer::TimerHandle;
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Arm the idle monitor, replacing any running one.
pub(crate) fn arm(manager: &LeaseManager, state: &mut LeaseState) {
    if let Some(old) = state.idle.take() {
        old.cancel();
    }

    let interval = manager.config().idle_check_interval;
    let idle_timeout = manager.config().idle_timeout;
    let weak = manager.downgrade();
    state.idle = Some(TimerHandle::spawn("idle", interval, move || {
        let Some(manager) = LeaseManager::upgrade(&weak) else {
            return ControlFlow::Break(());
        };

        let idle_for = {
            let state = manager.inner.state.lock();
            if state.lease.is_none() {
                return ControlFlow::Break(());
            }
            state.last_activity.elapsed()
        };
        if idle_for <= idle_timeout {
            return ControlFlow::Continue(());
        }

        info!(
            idle_secs = idle_for.as_secs(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "Lease idle too long, releasing"
        );
        // Release cancels this timer, so it must not run on this task.
        tokio::spawn(async move { manager.release().await });
        ControlFlow::Break(())
    }));

    debug!(
        interval_secs = interval.as_secs(),
        idle_timeout_secs = idle_timeout.as_secs(),
        "Idle monitor armed"
    );
}
