//! Request messages sent to the broker.

mod lease;
mod quota;

pub use lease::{AcquireRequest, ReleaseRequest, RenewRequest, ReportIssueRequest};
pub use quota::{QuotaReportEntry, QuotaReportRequest};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A broker call: where it is posted and what it answers with.
///
/// Type-safe request/response pairing, so a transport can be written once
/// for every call.
pub trait BrokerRequest: Serialize {
    /// Response body type.
    type Response: DeserializeOwned;

    /// Path relative to the broker base URL.
    fn path() -> &'static str;
}
