//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered server
//! - Bound per-tick parallelism and per-probe deadlines
//! - Fold outcomes through the hysteresis state machine into the registry
//!
//! A tick only ends once all of its probes have finished or timed out, so a
//! server never has two probes in flight and results apply in order.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::probe::{Probe, ProbeOutcome};
use crate::health::state::{apply_outcome, Thresholds, Transition};
use crate::load_balancer::{HealthStatus, Server, ServerRegistry};
use crate::observability::audit::{AuditEvent, AuditSink};
use crate::observability::metrics;

pub struct HealthMonitor {
    registry: Arc<ServerRegistry>,
    probe: Arc<dyn Probe>,
    config: HealthCheckConfig,
    audit: Arc<dyn AuditSink>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        probe: Arc<dyn Probe>,
        config: HealthCheckConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
            audit,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            timeout_ms = self.config.timeout_ms,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered server once. Returns the transitions applied.
    pub async fn check_all(&self) -> Vec<(Server, Transition)> {
        let snapshot = self.registry.snapshot();
        let timeout = self.config.timeout();
        let parallelism = self.config.max_concurrent_probes.max(1);

        let mut results = stream::iter(snapshot.iter().cloned())
            .map(|server| async move {
                let started = Instant::now();
                let outcome = match time::timeout(timeout, self.probe.probe(&server)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(server = %server.id, "Health check failed: timeout");
                        ProbeOutcome::failure(started.elapsed())
                    }
                };
                (server, outcome)
            })
            .buffer_unordered(parallelism);

        let thresholds = Thresholds::from(&self.config);
        let mut transitions = Vec::new();
        while let Some((server, outcome)) = results.next().await {
            if let Some(t) = self.record(&server, &outcome, &thresholds) {
                transitions.push(t);
            }
        }

        metrics::record_server_counts(self.registry.len(), self.registry.healthy_count());
        transitions
    }

    fn record(
        &self,
        probed: &Server,
        outcome: &ProbeOutcome,
        thresholds: &Thresholds,
    ) -> Option<(Server, Transition)> {
        // Fold against the live entry under the registry's writer lock. A server
        // re-registered at another address while the probe was in flight keeps
        // its own history.
        let applied = self.registry.update_health_with(&probed.id, |current| {
            if current.address() != probed.address() {
                return None;
            }
            Some(apply_outcome(&current.health, outcome, thresholds, SystemTime::now()))
        });

        let (updated, transition) = match applied {
            Ok(Some(applied)) => applied,
            Ok(None) => {
                tracing::debug!(server = %probed.id, "Server moved during probe, dropping result");
                return None;
            }
            Err(_) => {
                tracing::debug!(server = %probed.id, "Server removed during probe, dropping result");
                return None;
            }
        };

        let health = &updated.health;
        metrics::record_server_health(
            updated.id.as_str(),
            health.status == HealthStatus::Healthy,
            health.last_response_time_ms,
        );

        let transition = transition?;
        tracing::info!(
            server = %updated.id,
            from = %transition.from,
            to = %transition.to,
            consecutive_failures = health.consecutive_failures,
            consecutive_successes = health.consecutive_successes,
            "Server health changed"
        );
        metrics::record_health_transition(transition.to.as_str());
        self.audit.record(AuditEvent::HealthTransition {
            server: updated.id.clone(),
            from: transition.from,
            to: transition.to,
        });

        Some((updated, transition))
    }
}
