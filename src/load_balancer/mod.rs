//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! registry.rs snapshot (id-ordered, immutable)
//!     → SelectionEngine filters to Healthy, minus excluded ids
//!     → Selector picks one:
//!         - round_robin.rs (rotate through healthy servers)
//!         - least_conn.rs (lowest response time, lowest id on ties)
//!         - weighted.rs (cumulative-weight random draw)
//!         - key_hash.rs (stable hash of the selection key)
//!     → Server (owned copy) or NoHealthyServers
//! ```
//!
//! # Design Decisions
//! - The algorithm is fixed at construction; no per-call branching
//! - Selectors only ever see Healthy servers, in id order
//! - Selection never blocks on health-check writers

pub mod key_hash;
pub mod least_conn;
pub mod registry;
pub mod round_robin;
pub mod server;
pub mod weighted;

use std::fmt;

use crate::config::Algorithm;
use crate::error::{BalancerError, Result};

pub use registry::{Registration, ServerRegistry, Snapshot};
pub use server::{Health, HealthStatus, Server, ServerId};

/// A server selection strategy.
pub trait Selector: Send + Sync + fmt::Debug {
    /// Pick one of `healthy`. The slice is non-empty, contains only Healthy
    /// servers and is sorted by id. `key` is the selection key (session id).
    fn next_server<'a>(&self, healthy: &[&'a Server], key: &str) -> Option<&'a Server>;

    /// Strategy name for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the selector for a configured algorithm.
pub fn selector_for(algorithm: Algorithm) -> Box<dyn Selector> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Algorithm::Weighted => Box::new(weighted::Weighted::new()),
        Algorithm::KeyHash => Box::new(key_hash::KeyHash::new()),
    }
}

/// Applies the configured selector to registry snapshots.
#[derive(Debug)]
pub struct SelectionEngine {
    selector: Box<dyn Selector>,
}

impl SelectionEngine {
    pub fn new(algorithm: Algorithm) -> Self {
        Self::with_selector(selector_for(algorithm))
    }

    pub fn with_selector(selector: Box<dyn Selector>) -> Self {
        Self { selector }
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Select a Healthy server from `servers`.
    pub fn select(&self, servers: &[Server], key: &str) -> Result<Server> {
        self.select_excluding(servers, key, &[])
    }

    /// Select a Healthy server whose id is not in `exclude`.
    pub fn select_excluding(
        &self,
        servers: &[Server],
        key: &str,
        exclude: &[ServerId],
    ) -> Result<Server> {
        let mut healthy: Vec<&Server> = servers
            .iter()
            .filter(|s| s.is_healthy() && !exclude.contains(&s.id))
            .collect();

        if healthy.is_empty() {
            tracing::debug!(
                total = servers.len(),
                excluded = exclude.len(),
                "No healthy servers to select from"
            );
            return Err(BalancerError::NoHealthyServers);
        }

        // Registry snapshots are already ordered; arbitrary callers may not be.
        if !healthy.windows(2).all(|w| w[0].id < w[1].id) {
            healthy.sort_by(|a, b| a.id.cmp(&b.id));
        }

        self.selector
            .next_server(&healthy, key)
            .cloned()
            .ok_or(BalancerError::NoHealthyServers)
    }
}
