//! Broker client over HTTP.

use super::{build_client, error_body};
use async_trait::async_trait;
use poolkeeper_core::{BrokerApi, BrokerError};
use poolkeeper_messages::{
    AcquireRequest, BrokerRequest, LeaseGrant, QuotaReportRequest, ReleaseRequest,
    ReleaseResponse, RenewRequest, RenewResponse, ReportIssueRequest,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::trace;

/// Header carrying the broker API key.
const API_KEY_HEADER: &str = "X-API-Key";

/// [`BrokerApi`] over the broker's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBroker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpBroker {
    /// Create a client for the broker at `base_url`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let client = build_client(timeout).map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    /// POST a request and return the successful response.
    async fn send<R: BrokerRequest>(&self, request: &R) -> Result<reqwest::Response, BrokerError> {
        let url = format!("{}{}", self.base_url, R::path());
        trace!(%url, "Broker request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        Ok(response)
    }

    /// POST a request and decode its JSON response.
    async fn post<R: BrokerRequest>(&self, request: R) -> Result<R::Response, BrokerError> {
        let response = self.send(&request).await?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, BrokerError> {
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&body).map_err(|e| BrokerError::Decode(e.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> BrokerError {
        if error.is_timeout() {
            BrokerError::Timeout(self.timeout)
        } else {
            BrokerError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl BrokerApi for HttpBroker {
    async fn acquire(&self, request: AcquireRequest) -> Result<LeaseGrant, BrokerError> {
        self.post(request).await
    }

    async fn renew(&self, request: RenewRequest) -> Result<RenewResponse, BrokerError> {
        self.post(request).await
    }

    async fn release(&self, request: ReleaseRequest) -> Result<ReleaseResponse, BrokerError> {
        self.post(request).await
    }

    async fn report_issue(&self, request: ReportIssueRequest) -> Result<LeaseGrant, BrokerError> {
        Ok(self.post(request).await?.into_grant())
    }

    async fn report_quota(&self, request: QuotaReportRequest) -> Result<(), BrokerError> {
        self.send(&request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let broker =
            HttpBroker::new("https://broker.internal/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(broker.base_url, "https://broker.internal");
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let broker = HttpBroker::new("http://127.0.0.1:9", "key", Duration::from_secs(5)).unwrap();
        let err = broker
            .acquire(AcquireRequest::new(poolkeeper_types::ClientId::from_string("c")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Transport(_) | BrokerError::Timeout(_)
        ));
    }
}
