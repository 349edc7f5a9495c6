//! Heartbeat: renews the lease at half its TTL, then polls quota.
//!
//! Each tick's work runs as its own task. A renew that is still waiting on
//! the broker when the next tick fires does not delay that tick; both
//! requests are then in flight at once, and whichever completes last sets
//! the next period. Renew ignores a response for a lease that is no longer
//! installed, so overlapping ticks never resurrect a released lease.

use crate::error::LeaseError;
use crate::manager::{LeaseManager, LeaseState};
use crate::timer::TimerHandle;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, warn};

/// Arm the heartbeat for a lease granted with `ttl`, replacing any running one.
pub(crate) fn arm(manager: &LeaseManager, state: &mut LeaseState, ttl: Duration) {
    if let Some(old) = state.heartbeat.take() {
        old.cancel();
    }

    let period = manager.config().heartbeat_period(ttl);
    let weak = manager.downgrade();
    state.heartbeat = Some(TimerHandle::spawn("heartbeat", period, move || {
        let Some(manager) = LeaseManager::upgrade(&weak) else {
            return ControlFlow::Break(());
        };
        tokio::spawn(tick(manager));
        ControlFlow::Continue(())
    }));

    debug!(?period, "Heartbeat armed");
}

async fn tick(manager: LeaseManager) {
    match manager.renew().await {
        Ok(()) => {
            if let Some(quota) = manager.check_quota().await {
                debug!(remaining = quota.remaining, "Quota polled on heartbeat");
            }
        }
        Err(LeaseError::NoActiveLease) => {
            debug!("Heartbeat fired after lease was released");
        }
        Err(e) => {
            warn!(error = %e, "Heartbeat renewal failed, retrying on next tick");
        }
    }
}
