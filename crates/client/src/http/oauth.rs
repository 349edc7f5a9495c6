//! OAuth refresh-token exchange.

use super::{build_client, error_body};
use async_trait::async_trait;
use poolkeeper_core::{QuotaError, TokenRefresher};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// [`TokenRefresher`] against an OAuth 2.0 token endpoint.
#[derive(Clone)]
pub struct OAuthTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl OAuthTokenRefresher {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, QuotaError> {
        let client = build_client(timeout).map_err(|e| QuotaError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn access_token(&self, refresh_token: &str) -> Result<String, QuotaError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QuotaError::Timeout(self.timeout)
                } else {
                    QuotaError::TokenRefresh(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuotaError::TokenRefresh(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_body(response).await
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| QuotaError::TokenRefresh(e.to_string()))?;
        let token: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| QuotaError::TokenRefresh(e.to_string()))?;
        Ok(token.access_token)
    }
}

impl std::fmt::Debug for OAuthTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenRefresher")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
