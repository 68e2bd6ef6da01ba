//! Backend balancer daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │                   balancerd                        │
//!                 │                                                    │
//!   admin API ───▶│  admin ──▶ LoadBalancer ──▶ FailoverCoordinator    │
//!                 │                 │              │         │         │
//!                 │                 ▼              ▼         ▼         │
//!                 │          ServerRegistry ◀── Selection  Stickiness  │
//!                 │                 ▲                        Store     │
//!                 │                 │                                  │
//!                 │          HealthMonitor ──▶ Probe ──────────────────┼──▶ backends
//!                 └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use backend_balancer::admin::{self, AdminState};
use backend_balancer::config::loader::load_config;
use backend_balancer::config::{BalancerFileConfig, StickinessConfig};
use backend_balancer::lifecycle::{wait_for_signal, Shutdown};
use backend_balancer::observability::{logging, metrics};
use backend_balancer::stickiness::{MemoryStickinessStore, StickinessStore};
use backend_balancer::{LoadBalancer, Server};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const STICKY_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const FAILOVER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "balancerd", version, about = "Backend load balancer daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "BALANCER_CONFIG", default_value = "balancer.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "balancerd starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut shutdown = Shutdown::new();
    let store = build_store(&config.balancer.session_stickiness, &mut shutdown).await?;
    let balancer = Arc::new(
        LoadBalancer::builder(config.balancer.clone())
            .with_store(store)
            .build()?,
    );
    seed_servers(&balancer, &config)?;

    let handle = balancer.spawn_health_checker(shutdown.subscribe());
    shutdown.track("health-checker", handle);

    let sweeper = balancer.clone();
    shutdown.spawn("failover-sweep", move |mut rx| async move {
        let mut ticker = tokio::time::interval(FAILOVER_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweeper.purge_idle_sessions();
                    if removed > 0 {
                        tracing::debug!(removed, "Purged idle failover sessions");
                    }
                }
                _ = rx.recv() => break,
            }
        }
    });

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::setup_admin_router(AdminState::new(
            balancer.clone(),
            config.admin.api_key.as_str(),
        ));
        shutdown.spawn("admin-api", move |rx| async move {
            if let Err(e) = admin::serve(listener, router, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown signal received");

    let aborted = shutdown.drain(SHUTDOWN_GRACE).await;
    tracing::info!(aborted, "Shutdown complete");
    Ok(())
}

fn seed_servers(
    balancer: &LoadBalancer,
    config: &BalancerFileConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    for server in &config.servers {
        balancer.register_server(Server::from(server))?;
    }
    tracing::info!(count = config.servers.len(), "Seed servers registered");
    Ok(())
}

async fn build_store(
    config: &StickinessConfig,
    shutdown: &mut Shutdown,
) -> Result<Arc<dyn StickinessStore>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.redis_url {
        #[cfg(feature = "redis")]
        {
            let store = backend_balancer::stickiness::RedisStickinessStore::connect(url).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                redis_url = %url,
                "Built without the `redis` feature, using the in-process stickiness store"
            );
        }
    }

    let store = MemoryStickinessStore::new();
    let purge = store.clone();
    shutdown.spawn("sticky-purge", move |mut rx| async move {
        let mut ticker = tokio::time::interval(STICKY_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = purge.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Purged expired sticky bindings");
                    }
                }
                _ = rx.recv() => break,
            }
        }
    });
    Ok(Arc::new(store))
}
