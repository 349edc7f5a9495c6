//! Lease and account types.

use crate::LeaseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Credential bundle for one shared account.
///
/// Obtained by decrypting the broker's account payload. Never mutated by the
/// client; a switch replaces it as a unit together with the lease.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Account {
    /// Create an account without a project id.
    pub fn new(email: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            refresh_token: refresh_token.into(),
            project_id: None,
        }
    }

    /// Set the project id.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

// Keep refresh tokens out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("refresh_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// A time-bounded exclusive claim on one shared account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Broker-assigned identifier.
    pub lease_id: LeaseId,

    /// The account this lease grants exclusive use of.
    pub account: Account,

    /// When the broker will consider the lease abandoned.
    pub expires_at: DateTime<Utc>,

    /// TTL the broker granted with the most recent acquire/renew/switch.
    pub ttl: Duration,
}

impl Lease {
    /// Create a new lease.
    pub fn new(
        lease_id: LeaseId,
        account: Account,
        expires_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            lease_id,
            account,
            expires_at,
            ttl,
        }
    }

    /// Whether the lease has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time remaining until expiry, zero if already expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Apply a renewal: new expiry and TTL, same id and account.
    pub fn renew(&mut self, expires_at: DateTime<Utc>, ttl: Duration) {
        self.expires_at = expires_at;
        self.ttl = ttl;
    }
}
