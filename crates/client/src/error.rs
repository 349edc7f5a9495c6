//! Lease operation errors.

use poolkeeper_core::{BrokerError, DecryptError};
use poolkeeper_types::LeaseId;
use thiserror::Error;

/// Errors returned by lease operations.
///
/// Only acquire, renew and switch report failure to the caller. Release and
/// quota polling are best-effort: their failures are logged and swallowed.
#[derive(Debug, Clone, Error)]
pub enum LeaseError {
    /// The broker did not grant a lease, or its payload could not be used.
    #[error("Failed to acquire lease: {0}")]
    Acquire(#[source] FailureCause),

    /// Renew or switch was attempted without a held lease.
    #[error("No active lease")]
    NoActiveLease,

    /// Acquire was attempted while a lease is already held.
    #[error("Lease {lease_id} is already held")]
    AlreadyHeld { lease_id: LeaseId },

    /// The broker did not extend the lease. The lease is left as it was.
    #[error("Failed to renew lease: {0}")]
    Renew(#[source] FailureCause),

    /// The broker did not provide a usable replacement. The held lease is
    /// left as it was.
    #[error("Failed to switch account: {0}")]
    Switch(#[source] FailureCause),

    /// Acquire was refused, or its lease released again, because the
    /// process is shutting down.
    #[error("Shutting down")]
    ShuttingDown,
}

/// Underlying cause of a failed lease operation.
#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    /// The lease the request was made for was released or replaced while
    /// the request was in flight.
    #[error("lease {0} was replaced while the request was in flight")]
    Superseded(LeaseId),
}

impl LeaseError {
    /// Whether the failure came from the broker rejecting the request.
    pub fn is_broker_rejection(&self) -> bool {
        match self {
            LeaseError::Acquire(FailureCause::Broker(e))
            | LeaseError::Renew(FailureCause::Broker(e))
            | LeaseError::Switch(FailureCause::Broker(e)) => e.is_rejection(),
            _ => false,
        }
    }
}
