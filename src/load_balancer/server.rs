//! Server and health model.
//!
//! # Responsibilities
//! - Represent a single backend server and its identity
//! - Carry the latest health snapshot written by the health checker
//! - Build the probe URL for a server

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ServerConfig;

/// Unique server identifier, chosen by the caller at registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for ServerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ServerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Health classification of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Receives traffic.
    Healthy,
    /// Not yet probed. Never re-entered once left.
    Degraded,
    /// Excluded from selection.
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest health snapshot of a server.
///
/// `cpu`, `memory` and `error_rate` are only set from data the probe actually
/// returned; they stay `None` / `0.0` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub last_check: Option<SystemTime>,
    /// Latency of the last successful probe.
    pub last_response_time_ms: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Rolling failure ratio in `[0, 1]`.
    pub error_rate: f64,
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
}

impl Health {
    /// State of a freshly registered server.
    pub fn initial() -> Self {
        Self {
            status: HealthStatus::Degraded,
            last_check: None,
            last_response_time_ms: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            error_rate: 0.0,
            cpu: None,
            memory: None,
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::initial()
    }
}

/// A registered backend server.
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub id: ServerId,
    pub host: String,
    pub port: u16,
    /// Only used by weighted selection. Zero is rejected at registration.
    pub weight: u32,
    pub health: Health,
    /// Opaque to the balancer.
    pub metadata: BTreeMap<String, String>,
}

impl Server {
    /// Create a server with weight 1 in the initial `Degraded` state.
    pub fn new(id: impl Into<ServerId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            weight: 1,
            health: Health::initial(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the health snapshot. Mostly useful in tests.
    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.health.status = status;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.health.status == HealthStatus::Healthy
    }

    /// `host:port`, with IPv6 hosts bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// URL of the health endpoint at `path`.
    pub fn health_url(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}", self.address()))?.join(path)
    }
}

impl From<&ServerConfig> for Server {
    fn from(config: &ServerConfig) -> Self {
        Self {
            id: ServerId::new(config.id.clone()),
            host: config.host.clone(),
            port: config.port,
            weight: config.weight,
            health: Health::initial(),
            metadata: config.metadata.clone(),
        }
    }
}
