//! Collaborator traits.

use crate::{BrokerError, DecryptError, QuotaError};
use async_trait::async_trait;
use poolkeeper_messages::{
    AcquireRequest, LeaseGrant, QuotaReportRequest, ReleaseRequest, ReleaseResponse,
    RenewRequest, RenewResponse, ReportIssueRequest,
};
use poolkeeper_types::{Account, ModelQuota};

/// The remote lease broker.
///
/// Implementations perform exactly one network call per method and never
/// retry; the lease manager owns timeouts and retry cadence.
///
/// # Example
///
/// ```ignore
/// let grant = broker.acquire(AcquireRequest::new(client_id.clone())).await?;
/// let account = decryptor.decrypt(&grant.account)?;
/// ```
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Acquire any free account.
    async fn acquire(&self, request: AcquireRequest) -> Result<LeaseGrant, BrokerError>;

    /// Extend a held lease.
    async fn renew(&self, request: RenewRequest) -> Result<RenewResponse, BrokerError>;

    /// Give a lease back. Unknown or expired leases must not be an error.
    async fn release(&self, request: ReleaseRequest) -> Result<ReleaseResponse, BrokerError>;

    /// Report a problem with the held account and receive a replacement lease.
    ///
    /// Returns the replacement regardless of whether the broker wrapped it
    /// as `{new_lease: ...}`. A response without a well-formed lease is a
    /// [`BrokerError::Decode`].
    async fn report_issue(&self, request: ReportIssueRequest) -> Result<LeaseGrant, BrokerError>;

    /// Post the per-model quota breakdown. The response body is ignored.
    async fn report_quota(&self, request: QuotaReportRequest) -> Result<(), BrokerError>;
}

/// Decrypts the broker's opaque account payload.
pub trait PayloadDecryptor: Send + Sync {
    /// Decrypt and decode a payload into an account.
    fn decrypt(&self, ciphertext: &str) -> Result<Account, DecryptError>;
}

/// Exchanges an account's refresh token for a short-lived access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn access_token(&self, refresh_token: &str) -> Result<String, QuotaError>;
}

/// Reports remaining quota per model for an account.
#[async_trait]
pub trait ModelQuotaSource: Send + Sync {
    /// Fetch the per-model quota for the account the access token belongs to.
    ///
    /// `project_id` scopes the query when the account has one.
    async fn fetch_quotas(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<ModelQuota>, QuotaError>;
}
