//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use poolkeeper_client::{LeaseConfig, LeaseManager, QuotaSources};
use poolkeeper_test_helpers::{MockBroker, MockQuotaSource, StubDecryptor, StubTokenRefresher};
use std::sync::Arc;
use std::time::Duration;

/// Let spawned tasks run to their next await point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time in steps of at most a second, letting woken tasks
/// run after each step so every timer fires on its own deadline.
pub async fn advance(by: Duration) {
    let step = Duration::from_secs(1);
    let mut left = by;
    while !left.is_zero() {
        let next = left.min(step);
        tokio::time::advance(next).await;
        settle().await;
        left -= next;
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn manager(broker: &Arc<MockBroker>) -> LeaseManager {
    manager_with_config(broker, LeaseConfig::default())
}

pub fn manager_with_config(broker: &Arc<MockBroker>, config: LeaseConfig) -> LeaseManager {
    LeaseManager::builder(broker.clone(), Arc::new(StubDecryptor))
        .with_config(config)
        .build()
}

/// Quota collaborators plus a manager wired to them.
pub struct QuotaFixture {
    pub broker: Arc<MockBroker>,
    pub tokens: Arc<StubTokenRefresher>,
    pub models: Arc<MockQuotaSource>,
    pub manager: LeaseManager,
}

impl QuotaFixture {
    pub fn new() -> Self {
        let broker = Arc::new(MockBroker::new());
        let tokens = Arc::new(StubTokenRefresher::new());
        let models = Arc::new(MockQuotaSource::new());
        let manager = LeaseManager::builder(broker.clone(), Arc::new(StubDecryptor))
            .with_quota_sources(QuotaSources::new(tokens.clone(), models.clone()))
            .build();
        Self {
            broker,
            tokens,
            models,
            manager,
        }
    }
}
