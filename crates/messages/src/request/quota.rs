//! Quota report, posted fire-and-forget after each quota poll.

use crate::request::BrokerRequest;
use crate::response::IgnoredResponse;
use chrono::{DateTime, Utc};
use poolkeeper_types::ModelQuota;
use serde::Serialize;

/// One model's remaining quota as reported to the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaReportEntry {
    pub model_name: String,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

impl From<&ModelQuota> for QuotaReportEntry {
    fn from(quota: &ModelQuota) -> Self {
        Self {
            model_name: quota.model_name.clone(),
            percentage: quota.percentage(),
            reset_time: quota.reset_time,
        }
    }
}

/// Per-model quota breakdown for an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaReportRequest {
    pub account_email: String,
    pub quotas: Vec<QuotaReportEntry>,
}

impl QuotaReportRequest {
    pub fn new(account_email: impl Into<String>, models: &[ModelQuota]) -> Self {
        Self {
            account_email: account_email.into(),
            quotas: models.iter().map(QuotaReportEntry::from).collect(),
        }
    }
}

impl BrokerRequest for QuotaReportRequest {
    type Response = IgnoredResponse;

    fn path() -> &'static str {
        "/api/quota/report"
    }
}
