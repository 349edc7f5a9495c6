//! Lease manager: owns this process's single lease.
//!
//! # State Guard
//!
//! All mutable state (the lease, last activity, last quota poll, both timer
//! handles) sits behind one mutex that is never held across an `.await`.
//! Every transition happens inside the lock either before a network wait
//! (release clears state first) or after it (acquire, renew and switch
//! install their result), so a timer firing mid-request always sees a
//! consistent before or after state.
//!
//! Renew and switch remember the lease id they were issued for and only
//! apply their result if that lease is still installed. A lease released or
//! replaced while a request was in flight is never brought back. Switches
//! run one at a time, and a switch aimed at a lease that has already been
//! replaced never reaches the broker.

use crate::config::LeaseConfig;
use crate::error::{FailureCause, LeaseError};
use crate::timer::TimerHandle;
use crate::{heartbeat, idle};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use poolkeeper_core::{BrokerApi, BrokerError, ModelQuotaSource, PayloadDecryptor, TokenRefresher};
use poolkeeper_messages::{
    AcquireRequest, LeaseGrant, ReleaseRequest, RenewRequest, ReportIssueRequest,
};
use poolkeeper_types::{Account, ClientId, IssueType, Lease, LeaseId};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Called after every release attempt with the lease that was released.
pub type ReleaseCallback = Arc<dyn Fn(&Lease) + Send + Sync>;

/// Collaborators needed for quota polling.
#[derive(Clone)]
pub struct QuotaSources {
    pub(crate) token_refresher: Arc<dyn TokenRefresher>,
    pub(crate) model_quotas: Arc<dyn ModelQuotaSource>,
}

impl QuotaSources {
    pub fn new(
        token_refresher: Arc<dyn TokenRefresher>,
        model_quotas: Arc<dyn ModelQuotaSource>,
    ) -> Self {
        Self {
            token_refresher,
            model_quotas,
        }
    }
}

/// Mutable state guarded by [`ManagerInner::state`].
pub(crate) struct LeaseState {
    pub(crate) lease: Option<Lease>,
    pub(crate) last_activity: Instant,
    pub(crate) last_quota_check: Option<Instant>,
    pub(crate) quota_poll_in_flight: bool,
    pub(crate) heartbeat: Option<TimerHandle>,
    pub(crate) idle: Option<TimerHandle>,
}

impl LeaseState {
    fn new() -> Self {
        Self {
            lease: None,
            last_activity: Instant::now(),
            last_quota_check: None,
            quota_poll_in_flight: false,
            heartbeat: None,
            idle: None,
        }
    }

    /// Stop both timers.
    fn cancel_timers(&mut self) {
        if let Some(timer) = self.heartbeat.take() {
            timer.cancel();
        }
        if let Some(timer) = self.idle.take() {
            timer.cancel();
        }
    }
}

pub(crate) struct ManagerInner {
    pub(crate) config: LeaseConfig,
    client_id: ClientId,
    pub(crate) broker: Arc<dyn BrokerApi>,
    decryptor: Arc<dyn PayloadDecryptor>,
    pub(crate) quota_sources: Option<QuotaSources>,
    pub(crate) state: Mutex<LeaseState>,
    switch_lock: tokio::sync::Mutex<()>,
    release_callback: Mutex<Option<ReleaseCallback>>,
}

/// Owns at most one lease and keeps it alive.
///
/// Cheap to clone; clones share the same lease. Background timers hold only
/// a weak reference, so dropping every clone stops them.
#[derive(Clone)]
pub struct LeaseManager {
    pub(crate) inner: Arc<ManagerInner>,
}

/// Builder for [`LeaseManager`].
pub struct LeaseManagerBuilder {
    broker: Arc<dyn BrokerApi>,
    decryptor: Arc<dyn PayloadDecryptor>,
    config: LeaseConfig,
    quota_sources: Option<QuotaSources>,
    client_id: Option<ClientId>,
}

impl LeaseManagerBuilder {
    /// Set the lifecycle tunables.
    pub fn with_config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable quota polling.
    pub fn with_quota_sources(mut self, sources: QuotaSources) -> Self {
        self.quota_sources = Some(sources);
        self
    }

    /// Use a fixed client identity instead of generating one.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Build the manager. No lease is held until [`LeaseManager::acquire`].
    pub fn build(self) -> LeaseManager {
        let client_id = self.client_id.unwrap_or_else(ClientId::generate);
        debug!(%client_id, "Lease manager created");

        LeaseManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                client_id,
                broker: self.broker,
                decryptor: self.decryptor,
                quota_sources: self.quota_sources,
                state: Mutex::new(LeaseState::new()),
                switch_lock: tokio::sync::Mutex::new(()),
                release_callback: Mutex::new(None),
            }),
        }
    }
}

impl LeaseManager {
    /// Start building a manager around a broker and a payload decryptor.
    pub fn builder(
        broker: Arc<dyn BrokerApi>,
        decryptor: Arc<dyn PayloadDecryptor>,
    ) -> LeaseManagerBuilder {
        LeaseManagerBuilder {
            broker,
            decryptor,
            config: LeaseConfig::default(),
            quota_sources: None,
            client_id: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Acquire a lease on any free account.
    ///
    /// On success the heartbeat and idle monitor are armed. On failure
    /// nothing is stored and no timer starts.
    pub async fn acquire(&self) -> Result<Lease, LeaseError> {
        if let Some(lease_id) = self.current_lease_id() {
            return Err(LeaseError::AlreadyHeld { lease_id });
        }

        let request = AcquireRequest::new(self.inner.client_id.clone());
        let grant = self
            .bounded(self.inner.broker.acquire(request), BrokerError::Timeout)
            .await
            .map_err(|e| LeaseError::Acquire(e.into()))?;
        let lease = self.open_grant(grant).map_err(LeaseError::Acquire)?;

        {
            let mut state = self.inner.state.lock();
            let held = state.lease.as_ref().map(|l| l.lease_id.clone());
            if let Some(lease_id) = held {
                // Another acquire on this manager won the race.
                drop(state);
                self.release_orphan(lease.lease_id.clone());
                return Err(LeaseError::AlreadyHeld { lease_id });
            }

            state.lease = Some(lease.clone());
            state.last_activity = Instant::now();
            state.last_quota_check = None;
            heartbeat::arm(self, &mut state, lease.ttl);
            idle::arm(self, &mut state);
        }

        info!(
            lease_id = %lease.lease_id,
            email = %lease.account.email,
            ttl_secs = lease.ttl.as_secs(),
            expires_at = %lease.expires_at,
            "Lease acquired"
        );
        Ok(lease)
    }

    /// Extend the held lease.
    ///
    /// On failure the lease and its expiry are left unchanged; the next
    /// heartbeat tick is the retry.
    pub async fn renew(&self) -> Result<(), LeaseError> {
        let lease_id = self.current_lease_id().ok_or(LeaseError::NoActiveLease)?;

        let request = RenewRequest::new(lease_id.clone(), self.inner.client_id.clone());
        let response = self
            .bounded(self.inner.broker.renew(request), BrokerError::Timeout)
            .await
            .map_err(|e| LeaseError::Renew(e.into()))?;

        let ttl = response.ttl();
        {
            let mut state = self.inner.state.lock();
            match state.lease.as_mut() {
                Some(lease) if lease.lease_id == lease_id => {
                    lease.renew(response.expires_at, ttl);
                }
                Some(_) => return Err(LeaseError::Renew(FailureCause::Superseded(lease_id))),
                None => return Err(LeaseError::NoActiveLease),
            }
            heartbeat::arm(self, &mut state, ttl);
        }

        debug!(
            %lease_id,
            ttl_secs = ttl.as_secs(),
            expires_at = %response.expires_at,
            "Lease renewed"
        );
        Ok(())
    }

    /// Release the held lease. Idempotent and never fails.
    ///
    /// Timers are stopped and local state is cleared before the broker is
    /// contacted, so a caller shutting down never waits on the network to
    /// stop holding the lease, and a second release finds nothing to do.
    /// Broker failures are logged; the broker expires the lease on its own.
    pub async fn release(&self) {
        let lease = {
            let mut state = self.inner.state.lock();
            state.cancel_timers();
            state.lease.take()
        };
        let Some(lease) = lease else {
            return;
        };

        let request = ReleaseRequest::new(lease.lease_id.clone(), self.inner.client_id.clone());
        match self
            .bounded(self.inner.broker.release(request), BrokerError::Timeout)
            .await
        {
            Ok(_) => info!(lease_id = %lease.lease_id, email = %lease.account.email, "Lease released"),
            Err(e) => warn!(
                lease_id = %lease.lease_id,
                error = %e,
                "Lease release failed, broker will expire it"
            ),
        }

        let callback = self.inner.release_callback.lock().clone();
        if let Some(callback) = callback {
            callback(&lease);
        }
    }

    /// Report a problem with the held account and switch to a replacement.
    ///
    /// The swap only happens once the broker has returned a usable lease.
    /// Any failure leaves the held lease, its expiry and its timers exactly
    /// as they were.
    pub async fn report_issue(
        &self,
        issue: IssueType,
        reset_time: Option<DateTime<Utc>>,
    ) -> Result<Account, LeaseError> {
        let lease_id = self.current_lease_id().ok_or(LeaseError::NoActiveLease)?;
        self.report_issue_for(lease_id, issue, reset_time).await
    }

    /// Switch away from `old_id`, but only while it is still the held lease.
    ///
    /// Switches run one at a time. A report against a lease that has already
    /// been replaced fails with [`FailureCause::Superseded`] without reaching
    /// the broker, so an observation about an old account never rotates
    /// away from its replacement.
    pub(crate) async fn report_issue_for(
        &self,
        old_id: LeaseId,
        issue: IssueType,
        reset_time: Option<DateTime<Utc>>,
    ) -> Result<Account, LeaseError> {
        let _switching = self.inner.switch_lock.lock().await;
        match self.current_lease_id() {
            Some(current) if current == old_id => {}
            Some(_) => return Err(LeaseError::Switch(FailureCause::Superseded(old_id))),
            None => return Err(LeaseError::NoActiveLease),
        }

        let request = ReportIssueRequest::new(
            old_id.clone(),
            self.inner.client_id.clone(),
            issue,
            reset_time,
        );
        let grant = self
            .bounded(self.inner.broker.report_issue(request), BrokerError::Timeout)
            .await
            .map_err(|e| LeaseError::Switch(e.into()))?;
        let lease = self.open_grant(grant).map_err(LeaseError::Switch)?;

        {
            let mut state = self.inner.state.lock();
            let current = state.lease.as_ref().map(|l| l.lease_id.clone());
            if current.as_ref() != Some(&old_id) {
                drop(state);
                self.release_orphan(lease.lease_id.clone());
                return Err(match current {
                    Some(_) => LeaseError::Switch(FailureCause::Superseded(old_id)),
                    None => LeaseError::NoActiveLease,
                });
            }

            if let Some(timer) = state.heartbeat.take() {
                timer.cancel();
            }
            state.lease = Some(lease.clone());
            state.last_activity = Instant::now();
            state.last_quota_check = None;
            heartbeat::arm(self, &mut state, lease.ttl);
            idle::arm(self, &mut state);
        }

        info!(
            old_lease_id = %old_id,
            lease_id = %lease.lease_id,
            email = %lease.account.email,
            %issue,
            "Switched account"
        );
        Ok(lease.account)
    }

    /// Record that a unit of work just completed.
    pub fn update_activity(&self) {
        self.inner.state.lock().last_activity = Instant::now();
    }

    /// Register a callback run after every release attempt.
    pub fn on_release(&self, callback: impl Fn(&Lease) + Send + Sync + 'static) {
        *self.inner.release_callback.lock() = Some(Arc::new(callback));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// The account of the held lease.
    pub fn current_account(&self) -> Option<Account> {
        self.inner.state.lock().lease.as_ref().map(|l| l.account.clone())
    }

    /// The held lease.
    pub fn current_lease(&self) -> Option<Lease> {
        self.inner.state.lock().lease.clone()
    }

    /// Whether a lease is held.
    pub fn has_lease(&self) -> bool {
        self.inner.state.lock().lease.is_some()
    }

    /// When activity was last recorded.
    pub fn last_activity(&self) -> Instant {
        self.inner.state.lock().last_activity
    }

    /// Time since activity was last recorded.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// This process's client identity.
    pub fn client_id(&self) -> &ClientId {
        &self.inner.client_id
    }

    /// The lifecycle tunables.
    pub fn config(&self) -> &LeaseConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn current_lease_id(&self) -> Option<LeaseId> {
        self.inner
            .state
            .lock()
            .lease
            .as_ref()
            .map(|l| l.lease_id.clone())
    }

    /// Run a request under the configured timeout.
    pub(crate) async fn bounded<T, E>(
        &self,
        request: impl Future<Output = Result<T, E>>,
        timed_out: fn(Duration) -> E,
    ) -> Result<T, E> {
        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(timeout)),
        }
    }

    /// Decrypt a grant into a lease. A grant that cannot be used is handed
    /// back to the broker.
    fn open_grant(&self, grant: LeaseGrant) -> Result<Lease, FailureCause> {
        match self.inner.decryptor.decrypt(&grant.account) {
            Ok(account) => Ok(Lease::new(
                grant.lease_id.clone(),
                account,
                grant.expires_at,
                grant.ttl(),
            )),
            Err(e) => {
                warn!(lease_id = %grant.lease_id, error = %e, "Could not decrypt granted account");
                self.release_orphan(grant.lease_id);
                Err(e.into())
            }
        }
    }

    /// Best-effort release of a lease the broker granted but this manager
    /// will not install.
    fn release_orphan(&self, lease_id: LeaseId) {
        let manager = self.clone();
        tokio::spawn(async move {
            let request = ReleaseRequest::new(lease_id.clone(), manager.inner.client_id.clone());
            match manager
                .bounded(manager.inner.broker.release(request), BrokerError::Timeout)
                .await
            {
                Ok(_) => debug!(%lease_id, "Released unused lease"),
                Err(e) => warn!(%lease_id, error = %e, "Failed to release unused lease"),
            }
        });
    }
}

/// Wall-clock time `after` from now, saturating far in the future.
pub(crate) fn utc_after(after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
