//! Audit events.
//!
//! The host system decides where events go. The balancer only calls
//! [`AuditSink::record`] for registration changes, health transitions,
//! selections and failover activity.

use std::sync::{Mutex, PoisonError};

use crate::load_balancer::{HealthStatus, ServerId};

/// A structured event emitted by the balancer.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    ServerAdded {
        server: ServerId,
    },
    ServerUpdated {
        server: ServerId,
    },
    ServerRemoved {
        server: ServerId,
        bindings_dropped: usize,
    },
    HealthTransition {
        server: ServerId,
        from: HealthStatus,
        to: HealthStatus,
    },
    Selected {
        session: String,
        server: ServerId,
        sticky: bool,
    },
    FailoverAttempt {
        session: String,
        failed: ServerId,
        attempt: usize,
    },
    FailoverExhausted {
        session: String,
        tried: Vec<ServerId>,
    },
}

/// Receiver of audit events. Must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::ServerAdded { server } => {
                tracing::info!(server = %server, "Server added");
            }
            AuditEvent::ServerUpdated { server } => {
                tracing::info!(server = %server, "Server re-registered");
            }
            AuditEvent::ServerRemoved { server, bindings_dropped } => {
                tracing::info!(server = %server, bindings_dropped, "Server removed");
            }
            AuditEvent::HealthTransition { server, from, to } => {
                tracing::info!(server = %server, from = %from, to = %to, "Health transition");
            }
            AuditEvent::Selected { session, server, sticky } => {
                tracing::debug!(session = %session, server = %server, sticky, "Server selected");
            }
            AuditEvent::FailoverAttempt { session, failed, attempt } => {
                tracing::warn!(session = %session, failed = %failed, attempt, "Failover attempt");
            }
            AuditEvent::FailoverExhausted { session, tried } => {
                tracing::warn!(session = %session, tried = ?tried, "Failover exhausted");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Keeps every event in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Health transitions recorded for one server, in order.
    pub fn transitions_for(&self, server: &ServerId) -> Vec<(HealthStatus, HealthStatus)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AuditEvent::HealthTransition { server: s, from, to } if &s == server => {
                    Some((from, to))
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
