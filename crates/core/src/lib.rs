//! Collaborator interfaces for the lease lifecycle manager.
//!
//! The manager talks to four things it does not implement itself:
//!
//! - **Broker** ([`BrokerApi`]): grants, renews, releases and swaps leases
//! - **Decryptor** ([`PayloadDecryptor`]): turns the broker's account payload
//!   into an [`Account`](poolkeeper_types::Account)
//! - **Token refresher** ([`TokenRefresher`]): exchanges a refresh token for
//!   a short-lived access token
//! - **Quota source** ([`ModelQuotaSource`]): reports per-model remaining quota
//!
//! Production implementations live in `poolkeeper-client`; in-memory fakes
//! live in `poolkeeper-test-helpers`.

mod error;
mod traits;

pub use error::{BrokerError, DecryptError, QuotaError};
pub use traits::{BrokerApi, ModelQuotaSource, PayloadDecryptor, TokenRefresher};
