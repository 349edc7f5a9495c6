//! Quota polling and low-quota switching.

mod common;

use chrono::{TimeZone, Utc};
use common::{advance, manager, secs, settle, QuotaFixture};
use poolkeeper_core::QuotaError;
use poolkeeper_test_helpers::MockBroker;
use poolkeeper_types::{IssueType, ModelQuota};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn test_no_poll_without_lease() {
    let fixture = QuotaFixture::new();

    assert_eq!(fixture.manager.check_quota().await, None);
    assert_eq!(fixture.tokens.calls(), 0);
    assert_eq!(fixture.models.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_poll_without_quota_sources() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    assert_eq!(manager.check_quota().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_no_models_means_full_quota() {
    let fixture = QuotaFixture::new();
    fixture.manager.acquire().await.unwrap();

    let snapshot = fixture.manager.check_quota().await.unwrap();

    assert_eq!(snapshot.remaining, 100);
    assert_eq!(snapshot.total, 100);
    assert_eq!(fixture.broker.calls().report_issue, 0);
}

#[tokio::test(start_paused = true)]
async fn test_tightest_model_sets_snapshot() {
    let fixture = QuotaFixture::new();
    fixture.models.set_models(vec![
        ModelQuota::new("pro", 0.5, None),
        ModelQuota::new("flash", 0.8, None),
    ]);
    fixture.manager.acquire().await.unwrap();

    let snapshot = fixture.manager.check_quota().await.unwrap();

    assert_eq!(snapshot.remaining, 50);
    assert_eq!(snapshot.percentage, 50.0);
    assert_eq!(
        fixture.manager.current_account().unwrap().email,
        "account-1@example.com"
    );
}

#[tokio::test(start_paused = true)]
async fn test_polls_are_rate_limited() {
    let fixture = QuotaFixture::new();
    fixture.manager.acquire().await.unwrap();

    assert!(fixture.manager.check_quota().await.is_some());
    assert_eq!(fixture.manager.check_quota().await, None);
    assert_eq!(fixture.models.calls(), 1);

    advance(secs(299)).await;
    assert_eq!(fixture.manager.check_quota().await, None);

    advance(secs(1)).await;
    assert!(fixture.manager.check_quota().await.is_some());
    assert_eq!(fixture.models.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_switches_with_reported_reset() {
    let reset = Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap();
    let fixture = QuotaFixture::new();
    fixture.models.set_models(vec![
        ModelQuota::new("pro", 0.1, Some(reset)),
        ModelQuota::new("flash", 0.9, None),
    ]);
    fixture.manager.acquire().await.unwrap();

    let snapshot = fixture.manager.check_quota().await.unwrap();

    assert_eq!(snapshot.remaining, 10);
    let issues = fixture.broker.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, IssueType::QuotaExhausted);
    assert_eq!(issues[0].reset_time, Some(reset));
    assert_eq!(
        fixture.manager.current_account().unwrap().email,
        "account-2@example.com"
    );
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_without_reset_uses_fallback() {
    let fixture = QuotaFixture::new();
    fixture
        .models
        .set_models(vec![ModelQuota::new("pro", 0.2, None)]);
    fixture.manager.acquire().await.unwrap();

    let before = Utc::now();
    fixture.manager.check_quota().await.unwrap();
    let after = Utc::now();

    let reset = fixture.broker.issues()[0].reset_time.unwrap();
    assert!(reset >= before + chrono::Duration::hours(24));
    assert!(reset <= after + chrono::Duration::hours(24));
}

#[tokio::test(start_paused = true)]
async fn test_failed_low_quota_switch_keeps_account() {
    let fixture = QuotaFixture::new();
    fixture.broker.fail_report_issue(Some(poolkeeper_core::BrokerError::Status {
        status: 409,
        body: "no accounts available".to_string(),
    }));
    fixture
        .models
        .set_models(vec![ModelQuota::new("pro", 0.05, None)]);
    fixture.manager.acquire().await.unwrap();

    let snapshot = fixture.manager.check_quota().await.unwrap();

    assert_eq!(snapshot.remaining, 5);
    assert_eq!(
        fixture.manager.current_account().unwrap().email,
        "account-1@example.com"
    );
}

#[tokio::test(start_paused = true)]
async fn test_token_failure_yields_none_and_does_not_count_as_poll() {
    let fixture = QuotaFixture::new();
    fixture
        .tokens
        .fail(Some(QuotaError::TokenRefresh("invalid_grant".to_string())));
    fixture.manager.acquire().await.unwrap();

    assert_eq!(fixture.manager.check_quota().await, None);
    assert_eq!(fixture.models.calls(), 0);

    fixture.tokens.fail(None);
    assert!(fixture.manager.check_quota().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_quota_is_reported_to_broker() {
    let fixture = QuotaFixture::new();
    fixture.models.set_models(vec![
        ModelQuota::new("pro", 0.5, None),
        ModelQuota::new("flash", 0.75, None),
    ]);
    fixture.manager.acquire().await.unwrap();

    fixture.manager.check_quota().await.unwrap();
    settle().await;

    let reports = fixture.broker.quota_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].account_email, "account-1@example.com");
    assert_eq!(reports[0].quotas.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_polls_quota_after_renew() {
    let fixture = QuotaFixture::new();
    fixture.manager.acquire().await.unwrap();

    advance(secs(900)).await;

    assert_eq!(fixture.broker.calls().renew, 1);
    assert_eq!(fixture.models.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_polls_switch_once() {
    let fixture = QuotaFixture::new();
    fixture
        .models
        .set_models(vec![ModelQuota::new("pro", 0.05, None)]);
    fixture.models.set_delay(Some(secs(1)));
    fixture.manager.acquire().await.unwrap();

    let (first, second) = tokio::join!(
        fixture.manager.check_quota(),
        fixture.manager.check_quota()
    );

    assert!(first.is_some());
    assert_eq!(second, None);
    assert_eq!(fixture.models.calls(), 1);
    let issues = fixture.broker.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].lease_id.as_str(), "lease-1");
    assert_eq!(
        fixture.manager.current_account().unwrap().email,
        "account-2@example.com"
    );
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_for_replaced_lease_does_not_switch() {
    let fixture = QuotaFixture::new();
    fixture
        .models
        .set_models(vec![ModelQuota::new("pro", 0.05, None)]);
    fixture.models.set_delay(Some(secs(1)));
    fixture.manager.acquire().await.unwrap();

    let poll = tokio::spawn({
        let manager = fixture.manager.clone();
        async move { manager.check_quota().await }
    });
    settle().await;
    assert_eq!(fixture.models.calls(), 1);

    fixture
        .manager
        .report_issue(IssueType::AuthError, None)
        .await
        .unwrap();
    let snapshot = poll.await.unwrap().unwrap();

    assert_eq!(snapshot.remaining, 5);
    let issues = fixture.broker.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, IssueType::AuthError);
    assert_eq!(
        fixture.manager.current_account().unwrap().email,
        "account-2@example.com"
    );
}
