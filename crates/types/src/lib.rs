//! Core types for poolkeeper.
//!
//! A client process holds at most one [`Lease`] on a shared [`Account`] at a
//! time. These types describe that lease, the identity the broker uses to
//! correlate calls from one process, and the values the quota monitor and
//! rate-limit engine compute.

mod decision;
mod identifiers;
mod lease;
mod quota;

pub use decision::{IssueType, RateLimitDecision};
pub use identifiers::{ClientId, LeaseId};
pub use lease::{Account, Lease};
pub use quota::{ModelQuota, QuotaSnapshot, QuotaSummary};
