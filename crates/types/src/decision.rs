//! Account-switch reasons and rate-limit decisions.

use crate::Account;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why the client is asking the broker for a different account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Upstream answered with a rate-limit error that is too long to wait out.
    RateLimited,
    /// The account's model quota is (nearly) used up.
    QuotaExhausted,
    /// The account's credentials were rejected upstream.
    AuthError,
    /// Anything else that makes the account unusable.
    Other,
}

impl IssueType {
    /// Wire name of the issue type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::RateLimited => "rate_limited",
            IssueType::QuotaExhausted => "quota_exhausted",
            IssueType::AuthError => "auth_error",
            IssueType::Other => "other",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do about a rate-limit response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Pause for `wait` and retry with the same account.
    Wait { wait: Duration },
    /// A different account is now leased; retry with it immediately.
    Switch { account: Account },
}

impl RateLimitDecision {
    /// Whether this decision switched accounts.
    pub fn is_switch(&self) -> bool {
        matches!(self, RateLimitDecision::Switch { .. })
    }

    /// The new account, if this decision switched.
    pub fn new_account(&self) -> Option<&Account> {
        match self {
            RateLimitDecision::Switch { account } => Some(account),
            RateLimitDecision::Wait { .. } => None,
        }
    }
}
