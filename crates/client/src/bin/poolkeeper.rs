//! Poolkeeper CLI
//!
//! Holds a lease on a shared account from the broker and keeps it alive
//! until told to stop.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use poolkeeper_client::{ClientConfig, ShutdownCoordinator};
use poolkeeper_types::ClientId;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poolkeeper")]
#[command(about = "Lease a shared account from the pool broker")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Broker base URL (overrides config and POOLKEEPER_BROKER_URL)
    #[arg(long, global = true)]
    broker_url: Option<String>,

    /// Broker API key (overrides config and POOLKEEPER_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Account payload key (overrides config and POOLKEEPER_ENCRYPTION_KEY)
    #[arg(long, global = true)]
    encryption_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a lease and hold it until interrupted
    Run {
        /// How often to log lease status (e.g., "30s", "5m")
        #[arg(long, default_value = "60s")]
        status_interval: humantime::Duration,

        /// Report activity on every status tick so the lease is never idle-released
        #[arg(long)]
        keep_alive: bool,
    },

    /// Acquire a lease, poll its quota once, print it and release
    Quota,

    /// Print a freshly generated client id
    ClientId,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ClientConfig> {
        let config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ClientConfig::default(),
        };

        let mut config = config.apply_env();
        if let Some(url) = &self.broker_url {
            config.broker.url = Some(url.clone());
        }
        if let Some(key) = &self.api_key {
            config.broker.api_key = Some(key.clone());
        }
        if let Some(key) = &self.encryption_key {
            config.broker.encryption_key = Some(key.clone());
        }
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ClientId => {
            // Output goes to stdout; no logging.
            println!("{}", ClientId::generate());
        }

        Commands::Run {
            status_interval,
            keep_alive,
        } => {
            init_tracing();
            let config = cli.load_config()?;
            run(config, status_interval.into(), keep_alive).await?;
        }

        Commands::Quota => {
            init_tracing();
            let config = cli.load_config()?;
            quota(config).await?;
        }
    }

    Ok(())
}

async fn run(config: ClientConfig, status_interval: Duration, keep_alive: bool) -> anyhow::Result<()> {
    let manager = config.build_manager().context("building lease manager")?;
    let coordinator = ShutdownCoordinator::new(manager.clone()).into_shared();
    coordinator
        .install_signal_handlers()
        .context("installing signal handlers")?;

    let lease = coordinator.acquire().await.context("acquiring lease")?;
    info!(
        email = %lease.account.email,
        lease_id = %lease.lease_id,
        expires_at = %lease.expires_at,
        "Holding account"
    );

    let mut status = tokio::time::interval(status_interval);
    status.tick().await;
    loop {
        tokio::select! {
            _ = coordinator.wait_for_shutdown() => break,
            _ = status.tick() => {
                if keep_alive {
                    manager.update_activity();
                }
                match manager.current_lease() {
                    Some(lease) => info!(
                        email = %lease.account.email,
                        lease_id = %lease.lease_id,
                        expires_at = %lease.expires_at,
                        idle_secs = manager.idle_duration().as_secs(),
                        "Lease held"
                    ),
                    None => {
                        warn!("Lease no longer held, exiting");
                        break;
                    }
                }
            }
        }
    }

    coordinator.on_exit().await;
    Ok(())
}

async fn quota(config: ClientConfig) -> anyhow::Result<()> {
    if !config.quota.enabled {
        bail!("quota polling is disabled; set quota.enabled = true in the config");
    }

    let manager = config.build_manager().context("building lease manager")?;
    let coordinator = ShutdownCoordinator::new(manager.clone()).into_shared();
    coordinator
        .install_signal_handlers()
        .context("installing signal handlers")?;

    let lease = coordinator.acquire().await.context("acquiring lease")?;
    let snapshot = manager.check_quota().await;
    coordinator.on_exit().await;

    match snapshot {
        Some(snapshot) => println!(
            "{}: {}/{} ({:.1}%)",
            lease.account.email, snapshot.remaining, snapshot.total, snapshot.percentage
        ),
        None => bail!("quota poll for {} failed, see logs", lease.account.email),
    }
    Ok(())
}
