//! Acquire, heartbeat, idle release, release and switch.

mod common;

use common::{advance, manager, manager_with_config, secs, settle};
use poolkeeper_client::{FailureCause, LeaseConfig, LeaseError};
use poolkeeper_core::BrokerError;
use poolkeeper_test_helpers::MockBroker;
use poolkeeper_types::{IssueType, LeaseId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn unavailable() -> BrokerError {
    BrokerError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Acquire
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_acquire_returns_decrypted_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);

    let lease = manager.acquire().await.unwrap();

    assert_eq!(lease.lease_id, LeaseId::new("lease-1"));
    assert_eq!(lease.account.email, "account-1@example.com");
    assert_eq!(lease.ttl, secs(1800));
    assert_eq!(manager.current_account(), Some(lease.account));
}

#[tokio::test(start_paused = true)]
async fn test_acquire_failure_stores_nothing() {
    let broker = Arc::new(MockBroker::new());
    broker.fail_acquire(Some(BrokerError::Status {
        status: 409,
        body: "no accounts available".to_string(),
    }));
    let manager = manager(&broker);

    let err = manager.acquire().await.unwrap_err();

    assert!(err.is_broker_rejection());
    assert!(!manager.has_lease());
    advance(secs(3600)).await;
    assert_eq!(broker.calls().renew, 0);
    assert_eq!(broker.calls().release, 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_times_out() {
    let broker = Arc::new(MockBroker::new());
    broker.hang_acquire(true);
    let manager = manager_with_config(
        &broker,
        LeaseConfig::default().with_request_timeout(secs(10)),
    );

    let err = manager.acquire().await.unwrap_err();

    assert!(matches!(
        err,
        LeaseError::Acquire(FailureCause::Broker(BrokerError::Timeout(t))) if t == secs(10)
    ));
    assert!(!manager.has_lease());
}

// ═══════════════════════════════════════════════════════════════════════════
// Heartbeat
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_first_heartbeat_at_half_ttl() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    advance(Duration::from_millis(899_999)).await;
    assert_eq!(broker.calls().renew, 0);

    advance(Duration::from_millis(1)).await;
    assert_eq!(broker.calls().renew, 1);

    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 2);
    assert!(manager.has_lease());
}

#[tokio::test(start_paused = true)]
async fn test_failed_renew_retries_on_next_tick() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    let lease = manager.acquire().await.unwrap();
    broker.fail_next_renew();

    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 1);
    assert_eq!(manager.current_lease(), Some(lease));

    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 2);
    assert!(manager.has_lease());
}

#[tokio::test(start_paused = true)]
async fn test_manual_renew_failure_keeps_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    let lease = manager.acquire().await.unwrap();
    broker.fail_renew(Some(unavailable()));

    let err = manager.renew().await.unwrap_err();

    assert!(matches!(err, LeaseError::Renew(FailureCause::Broker(_))));
    assert_eq!(manager.current_lease(), Some(lease));
}

#[tokio::test(start_paused = true)]
async fn test_renew_without_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);

    assert!(matches!(
        manager.renew().await,
        Err(LeaseError::NoActiveLease)
    ));
    assert_eq!(broker.calls().renew, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_renews_overlap() {
    let broker = Arc::new(MockBroker::new().with_ttl(4));
    broker.set_renew_delay(Some(secs(3)));
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    // First tick at 2s; its renew is still in flight when the 4s tick fires.
    advance(secs(2)).await;
    assert_eq!(broker.calls().renew, 1);
    advance(secs(2)).await;
    assert_eq!(broker.calls().renew, 2);

    advance(secs(10)).await;
    assert!(manager.has_lease());
}

#[tokio::test(start_paused = true)]
async fn test_renew_in_flight_does_not_resurrect_released_lease() {
    let broker = Arc::new(MockBroker::new());
    broker.set_renew_delay(Some(secs(5)));
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 1);
    manager.release().await;

    advance(secs(5)).await;
    assert!(!manager.has_lease());
    advance(secs(3600)).await;
    assert_eq!(broker.calls().renew, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Idle monitor
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_idle_lease_is_released() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    advance(secs(60)).await;
    assert!(manager.has_lease());

    // Idle for exactly the timeout at 1200s is not yet too long.
    advance(secs(1199)).await;
    assert!(manager.has_lease());
    assert_eq!(broker.calls().release, 0);

    advance(secs(2)).await;
    assert!(!manager.has_lease());
    assert_eq!(broker.released(), vec![LeaseId::new("lease-1")]);
}

#[tokio::test(start_paused = true)]
async fn test_activity_postpones_idle_release() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    advance(secs(1000)).await;
    manager.update_activity();
    assert_eq!(manager.idle_duration(), Duration::ZERO);

    advance(secs(1190)).await;
    assert!(manager.has_lease());

    advance(secs(40)).await;
    assert!(!manager.has_lease());
    assert_eq!(broker.calls().release, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Release
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_release_without_lease_makes_no_call() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);

    manager.release().await;

    assert_eq!(broker.calls().release, 0);
}

#[tokio::test(start_paused = true)]
async fn test_release_is_idempotent() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    manager.release().await;
    manager.release().await;

    assert_eq!(broker.calls().release, 1);
    assert!(!manager.has_lease());
}

#[tokio::test(start_paused = true)]
async fn test_no_ticks_after_release() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    manager.release().await;
    advance(secs(7200)).await;

    assert_eq!(broker.calls().renew, 0);
    assert_eq!(broker.calls().release, 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_callback_sees_released_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    let lease = manager.acquire().await.unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = seen.clone();
    manager.on_release(move |released| {
        *sink.lock() = Some(released.lease_id.clone());
    });
    manager.release().await;

    assert_eq!(*seen.lock(), Some(lease.lease_id));
}

#[tokio::test(start_paused = true)]
async fn test_reacquire_after_release() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);
    manager.acquire().await.unwrap();
    manager.release().await;

    let lease = manager.acquire().await.unwrap();

    assert_eq!(lease.lease_id, LeaseId::new("lease-2"));
    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Switch
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_switch_replaces_lease_and_rearms_heartbeat() {
    let broker = Arc::new(MockBroker::new());
    broker.set_switch_ttl(Some(600));
    let manager = manager(&broker);
    manager.acquire().await.unwrap();

    let account = manager
        .report_issue(IssueType::AuthError, None)
        .await
        .unwrap();

    assert_eq!(account.email, "account-2@example.com");
    let lease = manager.current_lease().unwrap();
    assert_eq!(lease.lease_id, LeaseId::new("lease-2"));
    assert_eq!(lease.ttl, secs(600));

    let issues = broker.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].lease_id, LeaseId::new("lease-1"));
    assert_eq!(issues[0].issue_type, IssueType::AuthError);
    assert_eq!(issues[0].reset_time, None);

    advance(secs(300)).await;
    assert_eq!(broker.calls().renew, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_switch_keeps_lease_and_timers() {
    let broker = Arc::new(MockBroker::new());
    broker.fail_report_issue(Some(unavailable()));
    let manager = manager(&broker);
    let lease = manager.acquire().await.unwrap();

    let err = manager
        .report_issue(IssueType::RateLimited, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LeaseError::Switch(FailureCause::Broker(_))));
    assert_eq!(manager.current_lease(), Some(lease));
    advance(secs(900)).await;
    assert_eq!(broker.calls().renew, 1);
}

#[tokio::test(start_paused = true)]
async fn test_undecryptable_switch_keeps_lease_and_returns_grant() {
    let broker = Arc::new(MockBroker::new());
    broker.corrupt_next_switch();
    let manager = manager(&broker);
    let lease = manager.acquire().await.unwrap();

    let err = manager
        .report_issue(IssueType::Other, None)
        .await
        .unwrap_err();
    settle().await;

    assert!(matches!(err, LeaseError::Switch(FailureCause::Decrypt(_))));
    assert_eq!(manager.current_lease(), Some(lease));
    assert_eq!(broker.released(), vec![LeaseId::new("lease-2")]);
}

#[tokio::test(start_paused = true)]
async fn test_switch_without_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);

    let err = manager
        .report_issue(IssueType::RateLimited, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LeaseError::NoActiveLease));
    assert_eq!(broker.calls().report_issue, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_hold_one_lease() {
    let broker = Arc::new(MockBroker::new());
    let manager = manager(&broker);

    let (first, second) = tokio::join!(manager.acquire(), manager.acquire());
    settle().await;

    let granted = [first.is_ok(), second.is_ok()];
    assert_eq!(granted.iter().filter(|ok| **ok).count(), 1);
    assert!(manager.has_lease());

    let callbacks = Arc::new(AtomicU32::new(0));
    let counter = callbacks.clone();
    manager.on_release(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    manager.release().await;
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}
