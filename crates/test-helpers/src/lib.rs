//! Test helpers for Poolkeeper.
//!
//! In-memory stand-ins for the lease manager's collaborators:
//!
//! - [`MockBroker`]: a scripted broker that grants sequential leases and
//!   records every call
//! - [`StubDecryptor`]: decodes the plain payloads [`MockBroker`] hands out
//! - [`StubTokenRefresher`] and [`MockQuotaSource`]: scripted quota polling
//!
//! Timing knobs (`hang_*`, `set_renew_delay`) go through tokio's clock, so
//! they behave under `#[tokio::test(start_paused = true)]`.

mod broker;
mod decryptor;
mod quota;

pub use broker::{CallCounts, MockBroker, DEFAULT_TTL_SECS};
pub use decryptor::{stub_payload, StubDecryptor};
pub use quota::{MockQuotaSource, StubTokenRefresher};
