//! Response messages returned by the broker.

mod lease;

pub use lease::{LeaseGrant, ReleaseResponse, RenewResponse, ReportIssueResponse};

use serde::Deserialize;

/// Response body for fire-and-forget calls; whatever the broker sends is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct IgnoredResponse {}
