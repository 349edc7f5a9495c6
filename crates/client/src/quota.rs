//! Quota monitor: polls the held account's remaining model quota and
//! switches accounts when it runs low.

use crate::error::{FailureCause, LeaseError};
use crate::manager::{utc_after, LeaseManager, ManagerInner, QuotaSources};
use poolkeeper_core::{BrokerError, QuotaError};
use poolkeeper_messages::QuotaReportRequest;
use poolkeeper_types::{Account, IssueType, ModelQuota, QuotaSnapshot, QuotaSummary};
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl LeaseManager {
    /// Poll quota for the held account.
    ///
    /// Returns `None` without polling when no lease is held, quota sources
    /// are not configured, another poll is already in flight, or the last
    /// successful poll was less than the configured interval ago. Poll
    /// failures are logged and also yield `None`.
    ///
    /// A successful poll reports the per-model breakdown to the broker in
    /// the background and, if the tightest model is at or below the
    /// low-quota threshold, switches away from the lease that was polled.
    /// A result for a lease that has since been replaced switches nothing.
    pub async fn check_quota(&self) -> Option<QuotaSnapshot> {
        let sources = self.inner.quota_sources.clone()?;
        let (lease_id, account) = {
            let mut state = self.inner.state.lock();
            let lease = state.lease.as_ref()?;
            let held = (lease.lease_id.clone(), lease.account.clone());
            if state.quota_poll_in_flight {
                debug!("Quota poll already in flight, skipping");
                return None;
            }
            if let Some(last) = state.last_quota_check {
                if last.elapsed() < self.inner.config.quota_check_interval {
                    debug!("Quota polled recently, skipping");
                    return None;
                }
            }
            state.quota_poll_in_flight = true;
            held
        };
        let _slot = PollSlot(&self.inner);

        let models = match self.poll_quota(&sources, &account).await {
            Ok(models) => models,
            Err(e) => {
                warn!(email = %account.email, error = %e, "Quota check failed");
                return None;
            }
        };
        {
            let mut state = self.inner.state.lock();
            if state.lease.as_ref().map(|l| &l.lease_id) == Some(&lease_id) {
                state.last_quota_check = Some(Instant::now());
            }
        }

        let summary = QuotaSummary::from_models(&models);
        let snapshot = QuotaSnapshot::from(&summary);
        debug!(
            email = %account.email,
            models = models.len(),
            remaining = snapshot.remaining,
            "Quota polled"
        );

        self.spawn_quota_report(QuotaReportRequest::new(&account.email, &models));

        if summary.is_low(self.inner.config.low_quota_threshold) {
            let reset_time = summary
                .reset_time
                .unwrap_or_else(|| utc_after(self.inner.config.quota_reset_fallback));
            info!(
                email = %account.email,
                remaining = snapshot.remaining,
                %reset_time,
                "Quota low, switching account"
            );
            match self
                .report_issue_for(lease_id, IssueType::QuotaExhausted, Some(reset_time))
                .await
            {
                Ok(_) => {}
                Err(LeaseError::Switch(FailureCause::Superseded(stale))) => {
                    debug!(lease_id = %stale, "Lease already replaced, dropping low-quota result");
                }
                Err(e) => warn!(error = %e, "Low-quota switch failed, keeping current account"),
            }
        }

        Some(snapshot)
    }

    async fn poll_quota(
        &self,
        sources: &QuotaSources,
        account: &Account,
    ) -> Result<Vec<ModelQuota>, QuotaError> {
        let access_token = self
            .bounded(
                sources.token_refresher.access_token(&account.refresh_token),
                QuotaError::Timeout,
            )
            .await?;
        self.bounded(
            sources
                .model_quotas
                .fetch_quotas(&access_token, account.project_id.as_deref()),
            QuotaError::Timeout,
        )
        .await
    }

    fn spawn_quota_report(&self, request: QuotaReportRequest) {
        let manager = self.clone();
        tokio::spawn(async move {
            let email = request.account_email.clone();
            match manager
                .bounded(manager.inner.broker.report_quota(request), BrokerError::Timeout)
                .await
            {
                Ok(()) => debug!(%email, "Quota reported to broker"),
                Err(e) => warn!(%email, error = %e, "Quota report failed"),
            }
        });
    }
}

/// Holds the single quota poll slot until dropped.
struct PollSlot<'a>(&'a ManagerInner);

impl Drop for PollSlot<'_> {
    fn drop(&mut self) {
        self.0.state.lock().quota_poll_in_flight = false;
    }
}
