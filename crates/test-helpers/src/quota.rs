//! Scripted quota collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use poolkeeper_core::{ModelQuotaSource, QuotaError, TokenRefresher};
use poolkeeper_types::ModelQuota;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Hands out a fixed access token, or a scripted failure.
#[derive(Default)]
pub struct StubTokenRefresher {
    failure: Mutex<Option<QuotaError>>,
    calls: AtomicU32,
}

impl StubTokenRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, error: Option<QuotaError>) {
        *self.failure.lock() = error;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StubTokenRefresher {
    async fn access_token(&self, refresh_token: &str) -> Result<String, QuotaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(format!("access-for-{}", refresh_token)),
        }
    }
}

/// Reports whatever model quotas it was last given.
#[derive(Default)]
pub struct MockQuotaSource {
    models: Mutex<Vec<ModelQuota>>,
    failure: Mutex<Option<QuotaError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicU32,
}

impl MockQuotaSource {
    /// A source reporting no models.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(self, models: Vec<ModelQuota>) -> Self {
        self.set_models(models);
        self
    }

    pub fn set_models(&self, models: Vec<ModelQuota>) {
        *self.models.lock() = models;
    }

    pub fn fail(&self, error: Option<QuotaError>) {
        *self.failure.lock() = error;
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelQuotaSource for MockQuotaSource {
    async fn fetch_quotas(
        &self,
        _access_token: &str,
        _project_id: Option<&str>,
    ) -> Result<Vec<ModelQuota>, QuotaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.models.lock().clone())
    }
}
