//! Load balancer facade.
//!
//! Wires the registry, selection engine, stickiness store, failover
//! coordinator and health monitor behind one handle. Everything is injected
//! at construction; there is no global state.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::validation::validate_balancer;
use crate::config::LoadBalancerConfig;
use crate::error::{BalancerError, Result};
use crate::health::{HealthMonitor, HttpProbe, Probe};
use crate::load_balancer::{
    HealthStatus, Registration, SelectionEngine, Selector, Server, ServerId, ServerRegistry,
};
use crate::observability::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::observability::metrics;
use crate::resilience::FailoverCoordinator;
use crate::stickiness::{MemoryStickinessStore, StickinessStore};

/// Per-server view reported by [`LoadBalancer::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub address: String,
    pub weight: u32,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_response_time_ms: u64,
    /// Milliseconds since the Unix epoch.
    pub last_check_ms: Option<u64>,
    pub error_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl From<&Server> for ServerStats {
    fn from(server: &Server) -> Self {
        let health = &server.health;
        Self {
            address: server.address(),
            weight: server.weight,
            status: health.status,
            consecutive_failures: health.consecutive_failures,
            consecutive_successes: health.consecutive_successes,
            last_response_time_ms: health.last_response_time_ms,
            last_check_ms: health
                .last_check
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64),
            error_rate: health.error_rate,
            cpu: health.cpu,
            memory: health.memory,
            metadata: server.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub algorithm: String,
    pub server_count: usize,
    pub healthy_count: usize,
    pub per_server: BTreeMap<ServerId, ServerStats>,
}

/// Builder for [`LoadBalancer`]. Anything not supplied gets the in-process
/// default: memory store, HTTP probe, tracing audit sink, configured algorithm.
pub struct LoadBalancerBuilder {
    config: LoadBalancerConfig,
    store: Option<Arc<dyn StickinessStore>>,
    probe: Option<Arc<dyn Probe>>,
    audit: Option<Arc<dyn AuditSink>>,
    selector: Option<Box<dyn Selector>>,
}

impl LoadBalancerBuilder {
    pub fn with_store(mut self, store: Arc<dyn StickinessStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace the configured algorithm with a custom selector.
    pub fn with_selector(mut self, selector: Box<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn build(self) -> Result<LoadBalancer> {
        if let Err(errors) = validate_balancer(&self.config) {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BalancerError::Config(message));
        }

        let config = self.config;
        let registry = Arc::new(ServerRegistry::new());
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStickinessStore::new()));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(HttpProbe::new(config.health_check.path.clone())));
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
        let engine = match self.selector {
            Some(selector) => SelectionEngine::with_selector(selector),
            None => SelectionEngine::new(config.algorithm),
        };

        let coordinator = FailoverCoordinator::new(
            registry.clone(),
            engine,
            store.clone(),
            config.session_stickiness.clone(),
            config.failover.clone(),
            audit.clone(),
        );

        tracing::info!(
            algorithm = coordinator.algorithm_name(),
            stickiness = config.session_stickiness.enabled,
            failover = config.failover.enabled,
            health_checks = config.health_check.enabled,
            "Load balancer initialized"
        );

        Ok(LoadBalancer {
            config,
            registry,
            store,
            probe,
            audit,
            coordinator,
        })
    }
}

pub struct LoadBalancer {
    config: LoadBalancerConfig,
    registry: Arc<ServerRegistry>,
    store: Arc<dyn StickinessStore>,
    probe: Arc<dyn Probe>,
    audit: Arc<dyn AuditSink>,
    coordinator: FailoverCoordinator,
}

impl fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("algorithm", &self.coordinator.algorithm_name())
            .field("servers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl LoadBalancer {
    /// Balancer with default collaborators.
    pub fn new(config: LoadBalancerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: LoadBalancerConfig) -> LoadBalancerBuilder {
        LoadBalancerBuilder {
            config,
            store: None,
            probe: None,
            audit: None,
            selector: None,
        }
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Register a new server. It starts `Degraded` and takes no traffic until
    /// the health checker promotes it.
    pub fn add_server(&self, server: Server) -> Result<()> {
        let id = server.id.clone();
        let address = server.address();
        self.registry.add(server)?;
        tracing::info!(server = %id, address = %address, "Server registered");
        self.audit.record(AuditEvent::ServerAdded { server: id });
        self.publish_counts();
        Ok(())
    }

    /// Add or update a server, keeping health history on update.
    pub fn register_server(&self, server: Server) -> Result<Registration> {
        let id = server.id.clone();
        let registration = self.registry.register(server)?;
        let event = match registration {
            Registration::Created => AuditEvent::ServerAdded { server: id },
            Registration::Updated => AuditEvent::ServerUpdated { server: id },
        };
        self.audit.record(event);
        self.publish_counts();
        Ok(registration)
    }

    /// Remove a server and drop every sticky binding to it.
    pub async fn remove_server(&self, id: &ServerId) -> Result<Server> {
        let removed = self.registry.remove(id)?;

        let store_timeout = self.config.session_stickiness.store_timeout();
        let bindings_dropped =
            match time::timeout(store_timeout, self.store.delete_server(id)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::warn!(server = %id, error = %e, "Failed to drop sticky bindings");
                    0
                }
                Err(_) => {
                    tracing::warn!(server = %id, "Timed out dropping sticky bindings");
                    0
                }
            };

        tracing::info!(server = %id, bindings_dropped, "Server removed");
        self.audit.record(AuditEvent::ServerRemoved {
            server: id.clone(),
            bindings_dropped,
        });
        self.publish_counts();
        Ok(removed)
    }

    pub fn server(&self, id: &ServerId) -> Option<Server> {
        self.registry.get(id)
    }

    /// Server for `session`: its live sticky binding if usable, otherwise a
    /// fresh selection that skips servers already failed for the session.
    pub async fn get_server(&self, session: &str) -> Result<Server> {
        self.coordinator.get_server(session).await
    }

    pub async fn report_failure(&self, session: &str, server_id: &ServerId) -> Result<()> {
        self.coordinator.report_failure(session, server_id).await
    }

    pub fn report_success(&self, session: &str) {
        self.coordinator.report_success(session)
    }

    /// See [`FailoverCoordinator::call_with_failover`].
    pub async fn call_with_failover<F, Fut, T, E>(
        &self,
        session: &str,
        deadline: Instant,
        op: F,
    ) -> Result<T>
    where
        F: FnMut(Server) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        self.coordinator
            .call_with_failover(session, deadline, op)
            .await
    }

    /// Drop failover state for sessions idle past `failover.window_secs`.
    pub fn purge_idle_sessions(&self) -> usize {
        self.coordinator.purge_expired()
    }

    pub fn stats(&self) -> Stats {
        let snapshot = self.registry.snapshot();
        let per_server = snapshot
            .iter()
            .map(|server| (server.id.clone(), ServerStats::from(server)))
            .collect();

        Stats {
            algorithm: self.coordinator.algorithm_name().to_string(),
            server_count: snapshot.len(),
            healthy_count: snapshot.iter().filter(|s| s.is_healthy()).count(),
            per_server,
        }
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.registry.clone(),
            self.probe.clone(),
            self.config.health_check.clone(),
            self.audit.clone(),
        )
    }

    /// Run the health checker until `shutdown` fires.
    pub fn spawn_health_checker(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let monitor = self.health_monitor();
        tokio::spawn(monitor.run(shutdown))
    }

    fn publish_counts(&self) {
        metrics::record_server_counts(self.registry.len(), self.registry.healthy_count());
    }
}
