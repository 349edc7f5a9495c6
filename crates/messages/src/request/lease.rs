//! Lease lifecycle requests.

use crate::request::BrokerRequest;
use crate::response::{LeaseGrant, ReleaseResponse, RenewResponse, ReportIssueResponse};
use chrono::{DateTime, Utc};
use poolkeeper_types::{ClientId, IssueType, LeaseId};
use serde::Serialize;

/// Ask the broker for any free account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquireRequest {
    pub client_id: ClientId,
}

impl AcquireRequest {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id }
    }
}

impl BrokerRequest for AcquireRequest {
    type Response = LeaseGrant;

    fn path() -> &'static str {
        "/api/lease/acquire"
    }
}

/// Extend a held lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenewRequest {
    pub lease_id: LeaseId,
    pub client_id: ClientId,
}

impl RenewRequest {
    pub fn new(lease_id: LeaseId, client_id: ClientId) -> Self {
        Self {
            lease_id,
            client_id,
        }
    }
}

impl BrokerRequest for RenewRequest {
    type Response = RenewResponse;

    fn path() -> &'static str {
        "/api/lease/renew"
    }
}

/// Give a lease back. Releasing an unknown or expired lease is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRequest {
    pub lease_id: LeaseId,
    pub client_id: ClientId,
}

impl ReleaseRequest {
    pub fn new(lease_id: LeaseId, client_id: ClientId) -> Self {
        Self {
            lease_id,
            client_id,
        }
    }
}

impl BrokerRequest for ReleaseRequest {
    type Response = ReleaseResponse;

    fn path() -> &'static str {
        "/api/lease/release"
    }
}

/// Report a problem with the leased account and ask for a different one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportIssueRequest {
    pub lease_id: LeaseId,
    pub client_id: ClientId,
    pub issue_type: IssueType,

    /// When the account is expected to become usable again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

impl ReportIssueRequest {
    pub fn new(
        lease_id: LeaseId,
        client_id: ClientId,
        issue_type: IssueType,
        reset_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            lease_id,
            client_id,
            issue_type,
            reset_time,
        }
    }
}

impl BrokerRequest for ReportIssueRequest {
    type Response = ReportIssueResponse;

    fn path() -> &'static str {
        "/api/lease/report-issue"
    }
}
