//! Shutdown coordinator: makes sure the lease is released when the process
//! stops.
//!
//! Construct one coordinator at process start, share it by `Arc`, install
//! the signal handlers once, and call [`ShutdownCoordinator::on_exit`] on the
//! normal exit path. Whichever trigger comes first runs the shutdown
//! sequence; later triggers are ignored.
//!
//! The sequence is: mark shutdown in progress, arm a watchdog thread that
//! terminates the process if the sequence hangs, release the lease, disarm
//! the watchdog, notify waiters. The process is not terminated on success so
//! the owner can finish its own cleanup.

use crate::error::LeaseError;
use crate::manager::LeaseManager;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use poolkeeper_types::Lease;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What the watchdog does when shutdown overruns.
pub type WatchdogAction = Arc<dyn Fn() + Send + Sync>;

/// What started a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal, by name.
    Signal(&'static str),
    /// The program reached its normal exit path.
    Exit,
    /// Shutdown was requested programmatically.
    Requested,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(name) => write!(f, "signal {}", name),
            ShutdownTrigger::Exit => write!(f, "exit"),
            ShutdownTrigger::Requested => write!(f, "request"),
        }
    }
}

/// Releases the lease exactly once on process termination.
pub struct ShutdownCoordinator {
    manager: LeaseManager,
    watchdog_timeout: Duration,
    watchdog_action: WatchdogAction,
    shutting_down: AtomicBool,
    signals_installed: AtomicBool,
    done: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a coordinator for a manager. The watchdog timeout defaults to
    /// the manager's configured shutdown timeout.
    pub fn new(manager: LeaseManager) -> Self {
        let watchdog_timeout = manager.config().shutdown_timeout;
        let (done, _) = watch::channel(false);
        Self {
            manager,
            watchdog_timeout,
            watchdog_action: Arc::new(force_exit),
            shutting_down: AtomicBool::new(false),
            signals_installed: AtomicBool::new(false),
            done,
        }
    }

    /// Set the watchdog timeout.
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Replace what the watchdog does on overrun (default: exit with status 1).
    pub fn with_watchdog_action(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.watchdog_action = Arc::new(action);
        self
    }

    /// Wrap in an `Arc` for sharing with the signal listener.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Listen for termination signals (SIGINT, SIGTERM, SIGHUP on unix;
    /// Ctrl-C elsewhere).
    ///
    /// Returns `Ok(false)` if handlers were already installed by this
    /// coordinator. Must be called from within a tokio runtime.
    pub fn install_signal_handlers(self: &Arc<Self>) -> std::io::Result<bool> {
        if self.signals_installed.swap(true, Ordering::SeqCst) {
            debug!("Signal handlers already installed");
            return Ok(false);
        }

        let mut signals = match Signals::new() {
            Ok(signals) => signals,
            Err(e) => {
                self.signals_installed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(trigger) = signals.recv().await {
                coordinator.shutdown(trigger).await;
            }
        });

        debug!("Signal handlers installed");
        Ok(true)
    }

    /// Run the shutdown sequence if it has not run yet.
    ///
    /// Returns `true` if this call ran it.
    pub async fn shutdown(&self, trigger: ShutdownTrigger) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!(%trigger, "Shutdown already in progress, ignoring");
            return false;
        }

        info!(%trigger, "Shutting down, releasing lease");
        let watchdog = Watchdog::arm(self.watchdog_timeout, self.watchdog_action.clone());
        self.manager.release().await;
        watchdog.disarm();

        self.done.send_replace(true);
        info!(%trigger, "Shutdown complete");
        true
    }

    /// Acquire a lease unless shutdown has begun.
    ///
    /// With signal handlers installed first, a signal that arrives while
    /// the acquire is in flight is not lost: the granted lease is released
    /// and [`LeaseError::ShuttingDown`] returned.
    pub async fn acquire(&self) -> Result<Lease, LeaseError> {
        if self.is_shutting_down() {
            return Err(LeaseError::ShuttingDown);
        }
        let lease = self.manager.acquire().await?;
        if self.is_shutting_down() {
            info!(lease_id = %lease.lease_id, "Shutdown began during acquire, releasing");
            self.manager.release().await;
            return Err(LeaseError::ShuttingDown);
        }
        Ok(lease)
    }

    /// Normal-exit hook: release the lease unless a shutdown already did.
    pub async fn on_exit(&self) -> bool {
        self.shutdown(ShutdownTrigger::Exit).await
    }

    /// Whether a shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolve once a shutdown sequence has completed.
    pub async fn wait_for_shutdown(&self) {
        let mut done = self.done.subscribe();
        // The sender lives as long as `self`, so this only errors if it was dropped.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

fn force_exit() {
    std::process::exit(1);
}

/// Thread that runs the watchdog action unless disarmed in time.
///
/// A plain thread rather than a runtime task, so it still fires if the
/// runtime itself is wedged.
struct Watchdog {
    disarm: mpsc::Sender<()>,
}

impl Watchdog {
    fn arm(timeout: Duration, action: WatchdogAction) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("shutdown-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(timeout) {
                    error!(
                        ?timeout,
                        "Shutdown did not complete in time, forcing exit"
                    );
                    action();
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start shutdown watchdog");
        }
        Self { disarm }
    }

    fn disarm(self) {
        let _ = self.disarm.send(());
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownTrigger> {
        tokio::select! {
            received = self.interrupt.recv() => received.map(|()| ShutdownTrigger::Signal("SIGINT")),
            received = self.terminate.recv() => received.map(|()| ShutdownTrigger::Signal("SIGTERM")),
            received = self.hangup.recv() => received.map(|()| ShutdownTrigger::Signal("SIGHUP")),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<ShutdownTrigger> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ShutdownTrigger::Signal("Ctrl-C")),
            Err(e) => {
                warn!(error = %e, "Ctrl-C handler failed");
                None
            }
        }
    }
}
