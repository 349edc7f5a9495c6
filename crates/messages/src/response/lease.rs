//! Lease lifecycle responses.

use chrono::{DateTime, Utc};
use poolkeeper_types::LeaseId;
use serde::Deserialize;
use std::time::Duration;

/// A lease granted by acquire or report-issue.
///
/// `account` is the encrypted account payload; the client decrypts it with
/// the shared key before use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaseGrant {
    pub lease_id: LeaseId,
    pub account: String,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl LeaseGrant {
    /// The granted TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Response to a renew.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenewResponse {
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl RenewResponse {
    /// The granted TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Response to a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReleaseResponse {
    #[serde(default)]
    pub success: bool,
}

/// Response to report-issue: a replacement lease, bare or wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReportIssueResponse {
    Wrapped { new_lease: LeaseGrant },
    Bare(LeaseGrant),
}

impl ReportIssueResponse {
    /// Unwrap the replacement lease regardless of envelope.
    pub fn into_grant(self) -> LeaseGrant {
        match self {
            ReportIssueResponse::Wrapped { new_lease } => new_lease,
            ReportIssueResponse::Bare(grant) => grant,
        }
    }
}
