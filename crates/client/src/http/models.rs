//! Upstream model-availability client.
//!
//! Asks the upstream AI service which models the account can use and how
//! much of each model's quota is left. Models the service lists without
//! quota information are skipped.

use super::{build_client, error_body};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poolkeeper_core::{ModelQuotaSource, QuotaError};
use poolkeeper_types::ModelQuota;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

#[derive(Deserialize)]
struct AvailableModels {
    #[serde(default)]
    models: BTreeMap<String, ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    quota_info: Option<QuotaInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaInfo {
    remaining_fraction: Option<f64>,
    reset_time: Option<DateTime<Utc>>,
}

/// [`ModelQuotaSource`] over the upstream available-models endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelQuotaSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpModelQuotaSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, QuotaError> {
        let client = build_client(timeout).map_err(|e| QuotaError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> QuotaError {
        if error.is_timeout() {
            QuotaError::Timeout(self.timeout)
        } else {
            QuotaError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl ModelQuotaSource for HttpModelQuotaSource {
    async fn fetch_quotas(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<ModelQuota>, QuotaError> {
        let body = match project_id {
            Some(project) => json!({ "project": project }),
            None => json!({}),
        };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuotaError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        parse_models(&body)
    }
}

/// Parse an available-models response into per-model quotas.
///
/// Models without `quotaInfo` are not quota-tracked and are skipped. Inside
/// `quotaInfo` a missing `remainingFraction` means zero, since zero values
/// are left out of the JSON encoding.
fn parse_models(body: &[u8]) -> Result<Vec<ModelQuota>, QuotaError> {
    let available: AvailableModels =
        serde_json::from_slice(body).map_err(|e| QuotaError::Decode(e.to_string()))?;

    let quotas = available
        .models
        .into_iter()
        .filter_map(|(name, info)| {
            let quota = info.quota_info?;
            let fraction = quota.remaining_fraction.unwrap_or_else(|| {
                trace!(model = %name, "Model has no remaining fraction, treating as exhausted");
                0.0
            });
            Some(ModelQuota::new(name, fraction, quota.reset_time))
        })
        .collect();
    Ok(quotas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolkeeper_types::QuotaSummary;

    #[test]
    fn test_parse_models() {
        let body = br#"{
            "models": {
                "gemini-pro": {
                    "quotaInfo": { "remainingFraction": 0.4, "resetTime": "2026-01-01T00:00:00Z" }
                },
                "gemini-flash": {
                    "quotaInfo": { "remainingFraction": 0.9 }
                },
                "embedding": { "displayName": "no quota here" },
                "exhausted": { "quotaInfo": { "resetTime": "2026-01-01T08:00:00Z" } }
            }
        }"#;

        let models = parse_models(body).unwrap();

        assert_eq!(models.len(), 3);
        let pro = models.iter().find(|m| m.model_name == "gemini-pro").unwrap();
        assert_eq!(pro.remaining_fraction, 0.4);
        assert!(pro.reset_time.is_some());
        let flash = models.iter().find(|m| m.model_name == "gemini-flash").unwrap();
        assert_eq!(flash.reset_time, None);
        let exhausted = models.iter().find(|m| m.model_name == "exhausted").unwrap();
        assert_eq!(exhausted.remaining_fraction, 0.0);
        assert_eq!(
            exhausted.reset_time,
            Some("2026-01-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn test_exhausted_models_summarize_as_low() {
        let body = br#"{
            "models": {
                "gemini-pro": { "quotaInfo": { "resetTime": "2026-01-01T08:00:00Z" } },
                "gemini-flash": { "quotaInfo": { "remainingFraction": 0.9 } }
            }
        }"#;

        let summary = QuotaSummary::from_models(&parse_models(body).unwrap());

        assert_eq!(summary.remaining_fraction, 0.0);
        assert!(summary.is_low(0.2));
        assert_eq!(
            summary.reset_time,
            Some("2026-01-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn test_parse_models_empty() {
        assert!(parse_models(b"{}").unwrap().is_empty());
        assert!(parse_models(br#"{"models":{}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_models_rejects_non_json() {
        assert!(matches!(
            parse_models(b"<html>"),
            Err(QuotaError::Decode(_))
        ));
    }
}
