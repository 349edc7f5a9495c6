//! Poolkeeper client
//!
//! Keeps exactly one lease on a shared account held by a remote broker, for
//! the lifetime of one client process.
//!
//! # Architecture
//!
//! - **[`LeaseManager`]**: owns the lease; acquire, renew, release and switch
//! - **Heartbeat**: renews at half the granted TTL, then polls quota
//! - **Idle monitor**: releases the lease after a period without activity
//! - **Quota monitor**: switches accounts when the held one runs low
//! - **Rate-limit engine**: decides between waiting out a rate limit and switching
//! - **[`ShutdownCoordinator`]**: releases the lease on termination signals and exit
//!
//! Collaborators (broker, payload decryption, token refresh, model quota)
//! are traits from `poolkeeper-core`; [`http`] and [`crypto`] provide the
//! production implementations.
//!
//! # Example
//!
//! ```ignore
//! use poolkeeper_client::{LeaseConfig, LeaseManager, ShutdownCoordinator};
//!
//! let manager = LeaseManager::builder(broker, decryptor)
//!     .with_config(LeaseConfig::default())
//!     .build();
//! let lease = manager.acquire().await?;
//!
//! let coordinator = ShutdownCoordinator::new(manager.clone()).into_shared();
//! coordinator.install_signal_handlers()?;
//!
//! // ... do work, calling manager.update_activity() after each unit ...
//!
//! coordinator.on_exit().await;
//! ```

pub mod config;
pub mod crypto;
pub mod error;
mod heartbeat;
pub mod http;
mod idle;
pub mod manager;
mod quota;
mod rate_limit;
pub mod shutdown;
mod timer;

pub use config::{ClientConfig, ConfigError, LeaseConfig};
pub use crypto::AesGcmDecryptor;
pub use error::{FailureCause, LeaseError};
pub use manager::{LeaseManager, LeaseManagerBuilder, QuotaSources};
pub use shutdown::{ShutdownCoordinator, ShutdownTrigger};
