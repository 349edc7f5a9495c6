//! Scripted in-memory broker.

use crate::decryptor::stub_payload;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use poolkeeper_core::{BrokerApi, BrokerError};
use poolkeeper_messages::{
    AcquireRequest, LeaseGrant, QuotaReportRequest, ReleaseRequest, ReleaseResponse,
    RenewRequest, RenewResponse, ReportIssueRequest,
};
use poolkeeper_types::{Account, LeaseId};
use std::time::Duration;

/// TTL granted unless overridden.
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// How many times each broker method was called, counted when the call
/// starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub acquire: u32,
    pub renew: u32,
    pub release: u32,
    pub report_issue: u32,
    pub report_quota: u32,
}

#[derive(Default)]
struct Script {
    ttl_secs: u64,
    switch_ttl_secs: Option<u64>,
    next_lease: u64,

    fail_acquire: Option<BrokerError>,
    fail_renew: Option<BrokerError>,
    fail_release: Option<BrokerError>,
    fail_report_issue: Option<BrokerError>,
    failing_renews: u32,
    corrupt_next_switch: bool,
    hang_acquire: bool,
    hang_release: bool,
    acquire_delay: Option<Duration>,
    renew_delay: Option<Duration>,
    switch_delay: Option<Duration>,

    calls: CallCounts,
    released: Vec<LeaseId>,
    issues: Vec<ReportIssueRequest>,
    quota_reports: Vec<QuotaReportRequest>,
}

/// A broker that grants leases `lease-1`, `lease-2`, ... on accounts
/// `account-1@example.com`, `account-2@example.com`, ..., with payloads
/// readable by [`crate::StubDecryptor`].
pub struct MockBroker {
    script: Mutex<Script>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                ttl_secs: DEFAULT_TTL_SECS,
                ..Script::default()
            }),
        }
    }

    /// Grant this TTL on acquire, renew and (unless overridden) switch.
    pub fn with_ttl(self, ttl_secs: u64) -> Self {
        self.script.lock().ttl_secs = ttl_secs;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scripting
    // ═══════════════════════════════════════════════════════════════════════

    /// Fail every acquire with `error` (or stop failing with `None`).
    pub fn fail_acquire(&self, error: Option<BrokerError>) {
        self.script.lock().fail_acquire = error;
    }

    /// Fail every renew with `error`.
    pub fn fail_renew(&self, error: Option<BrokerError>) {
        self.script.lock().fail_renew = error;
    }

    /// Fail every release with `error`.
    pub fn fail_release(&self, error: Option<BrokerError>) {
        self.script.lock().fail_release = error;
    }

    /// Fail every report-issue with `error`.
    pub fn fail_report_issue(&self, error: Option<BrokerError>) {
        self.script.lock().fail_report_issue = error;
    }

    /// Fail only the next renew, with a 503.
    pub fn fail_next_renew(&self) {
        self.script.lock().failing_renews += 1;
    }

    /// Answer the next report-issue with a payload no decryptor accepts.
    pub fn corrupt_next_switch(&self) {
        self.script.lock().corrupt_next_switch = true;
    }

    /// Never answer acquire calls.
    pub fn hang_acquire(&self, hang: bool) {
        self.script.lock().hang_acquire = hang;
    }

    /// Never answer release calls.
    pub fn hang_release(&self, hang: bool) {
        self.script.lock().hang_release = hang;
    }

    /// Delay every acquire response.
    pub fn set_acquire_delay(&self, delay: Option<Duration>) {
        self.script.lock().acquire_delay = delay;
    }

    /// Delay every renew response.
    pub fn set_renew_delay(&self, delay: Option<Duration>) {
        self.script.lock().renew_delay = delay;
    }

    /// Delay every report-issue response. The issue is recorded on arrival.
    pub fn set_switch_delay(&self, delay: Option<Duration>) {
        self.script.lock().switch_delay = delay;
    }

    /// Grant a different TTL on switch.
    pub fn set_switch_ttl(&self, ttl_secs: Option<u64>) {
        self.script.lock().switch_ttl_secs = ttl_secs;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> CallCounts {
        self.script.lock().calls
    }

    /// Lease ids that release was called with, in order.
    pub fn released(&self) -> Vec<LeaseId> {
        self.script.lock().released.clone()
    }

    /// Report-issue requests received, in order.
    pub fn issues(&self) -> Vec<ReportIssueRequest> {
        self.script.lock().issues.clone()
    }

    /// Quota reports received, in order.
    pub fn quota_reports(&self) -> Vec<QuotaReportRequest> {
        self.script.lock().quota_reports.clone()
    }
}

impl Script {
    fn grant(&mut self, ttl_secs: u64) -> LeaseGrant {
        self.next_lease += 1;
        let n = self.next_lease;
        let account = Account::new(format!("account-{}@example.com", n), format!("refresh-{}", n));
        LeaseGrant {
            lease_id: LeaseId::new(format!("lease-{}", n)),
            account: stub_payload(&account),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs as i64),
            ttl_seconds: ttl_secs,
        }
    }
}

#[async_trait]
impl BrokerApi for MockBroker {
    async fn acquire(&self, _request: AcquireRequest) -> Result<LeaseGrant, BrokerError> {
        let (hang, delay) = {
            let mut script = self.script.lock();
            script.calls.acquire += 1;
            if let Some(error) = script.fail_acquire.clone() {
                return Err(error);
            }
            (script.hang_acquire, script.acquire_delay)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        let ttl = script.ttl_secs;
        Ok(script.grant(ttl))
    }

    async fn renew(&self, _request: RenewRequest) -> Result<RenewResponse, BrokerError> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.renew += 1;
            script.renew_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        if script.failing_renews > 0 {
            script.failing_renews -= 1;
            return Err(BrokerError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        if let Some(error) = script.fail_renew.clone() {
            return Err(error);
        }
        Ok(RenewResponse {
            expires_at: Utc::now() + chrono::Duration::seconds(script.ttl_secs as i64),
            ttl_seconds: script.ttl_secs,
        })
    }

    async fn release(&self, request: ReleaseRequest) -> Result<ReleaseResponse, BrokerError> {
        let hang = {
            let mut script = self.script.lock();
            script.calls.release += 1;
            script.released.push(request.lease_id);
            if let Some(error) = script.fail_release.clone() {
                return Err(error);
            }
            script.hang_release
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(ReleaseResponse { success: true })
    }

    async fn report_issue(&self, request: ReportIssueRequest) -> Result<LeaseGrant, BrokerError> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.report_issue += 1;
            script.issues.push(request);
            if let Some(error) = script.fail_report_issue.clone() {
                return Err(error);
            }
            script.switch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        let ttl = script.switch_ttl_secs.unwrap_or(script.ttl_secs);
        let mut grant = script.grant(ttl);
        if std::mem::take(&mut script.corrupt_next_switch) {
            grant.account = "corrupted".to_string();
        }
        Ok(grant)
    }

    async fn report_quota(&self, request: QuotaReportRequest) -> Result<(), BrokerError> {
        let mut script = self.script.lock();
        script.calls.report_quota += 1;
        script.quota_reports.push(request);
        Ok(())
    }
}
