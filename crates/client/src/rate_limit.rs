//! Rate-limit decision engine: wait it out or switch accounts.

use crate::error::{FailureCause, LeaseError};
use crate::manager::{utc_after, LeaseManager};
use chrono::{DateTime, Utc};
use poolkeeper_types::{IssueType, LeaseId, RateLimitDecision};
use std::time::Duration;
use tracing::{debug, info, warn};

impl LeaseManager {
    /// Whether a rate-limit wait is too long to sit out.
    pub fn should_switch_on_rate_limit(&self, wait: Duration) -> bool {
        wait > self.inner.config.max_rate_limit_wait
    }

    /// Decide how to handle a rate-limit response from upstream, for the
    /// lease held right now.
    ///
    /// Short waits are returned as [`RateLimitDecision::Wait`]. Longer ones
    /// trigger a switch, with `quota_reset` (or now + `wait`) as the reset
    /// hint. If the switch fails the caller is told to wait after all, so
    /// there is always something actionable to do.
    pub async fn handle_rate_limit(
        &self,
        wait: Duration,
        issue: Option<IssueType>,
        quota_reset: Option<DateTime<Utc>>,
    ) -> RateLimitDecision {
        let lease_id = self.current_lease_id();
        self.decide_rate_limit(lease_id, wait, issue, quota_reset)
            .await
    }

    /// Like [`handle_rate_limit`](Self::handle_rate_limit), for a response
    /// received while using the account of `lease_id`.
    ///
    /// If that lease has already been replaced, no second switch is made and
    /// the caller is pointed at the account now held.
    pub async fn handle_rate_limit_for(
        &self,
        lease_id: &LeaseId,
        wait: Duration,
        issue: Option<IssueType>,
        quota_reset: Option<DateTime<Utc>>,
    ) -> RateLimitDecision {
        self.decide_rate_limit(Some(lease_id.clone()), wait, issue, quota_reset)
            .await
    }

    async fn decide_rate_limit(
        &self,
        lease_id: Option<LeaseId>,
        wait: Duration,
        issue: Option<IssueType>,
        quota_reset: Option<DateTime<Utc>>,
    ) -> RateLimitDecision {
        self.update_activity();

        if !self.should_switch_on_rate_limit(wait) {
            debug!(?wait, "Rate limited, waiting");
            return RateLimitDecision::Wait { wait };
        }
        let Some(lease_id) = lease_id else {
            debug!(?wait, "Rate limit too long but no lease held, waiting");
            return RateLimitDecision::Wait { wait };
        };

        let issue = issue.unwrap_or(IssueType::RateLimited);
        let reset_time = quota_reset.unwrap_or_else(|| utc_after(wait));
        match self.report_issue_for(lease_id, issue, Some(reset_time)).await {
            Ok(account) => {
                info!(
                    ?wait,
                    email = %account.email,
                    "Rate limit too long, switched account"
                );
                RateLimitDecision::Switch { account }
            }
            Err(LeaseError::Switch(FailureCause::Superseded(stale))) => {
                match self.current_account() {
                    Some(account) => {
                        debug!(
                            lease_id = %stale,
                            email = %account.email,
                            "Lease already replaced, using current account"
                        );
                        RateLimitDecision::Switch { account }
                    }
                    None => RateLimitDecision::Wait { wait },
                }
            }
            Err(e) => {
                warn!(
                    ?wait,
                    error = %e,
                    "Rate limit too long but switch failed, waiting"
                );
                RateLimitDecision::Wait { wait }
            }
        }
    }
}
