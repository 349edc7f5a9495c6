//! Wire messages for the lease broker HTTP API.
//!
//! Every request body carries the caller's `client_id`; the broker
//! authenticates the call itself through the `X-API-Key` header, which is
//! the transport's concern and not part of these types.

pub mod request;
pub mod response;

// Re-export commonly used types
pub use request::{
    AcquireRequest, BrokerRequest, QuotaReportEntry, QuotaReportRequest, ReleaseRequest,
    RenewRequest, ReportIssueRequest,
};
pub use response::{
    IgnoredResponse, LeaseGrant, ReleaseResponse, RenewResponse, ReportIssueResponse,
};
