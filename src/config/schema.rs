//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults so a minimal file (or none) is valid.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root of the daemon configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerFileConfig {
    /// Core load balancer settings.
    #[serde(flatten)]
    pub balancer: LoadBalancerConfig,

    /// Servers registered at startup.
    pub servers: Vec<ServerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Configuration consumed by [`crate::LoadBalancer`].
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Selection algorithm, fixed for the lifetime of the balancer.
    pub algorithm: Algorithm,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Session affinity settings.
    pub session_stickiness: StickinessConfig,

    /// Failover settings.
    pub failover: FailoverConfig,
}

/// Server selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
    KeyHash,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::LeastConnections => "least_connections",
            Algorithm::Weighted => "weighted",
            Algorithm::KeyHash => "key_hash",
        }
    }
}

/// Static server definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unique server identifier.
    pub id: String,

    /// Hostname or IP address.
    pub host: String,

    /// Port the health endpoint listens on.
    pub port: u16,

    /// Weight for weighted selection (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Opaque key/value metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic health checker.
    pub enabled: bool,

    /// Health check interval in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Maximum number of probes in flight during one tick.
    pub max_concurrent_probes: usize,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            timeout_ms: 5_000,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            max_concurrent_probes: 16,
        }
    }
}

/// Session stickiness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StickinessConfig {
    /// Bind sessions to the server chosen for their first request.
    pub enabled: bool,

    /// Lifetime of a binding in seconds.
    pub ttl_seconds: u64,

    /// Upper bound on any single store call, in milliseconds.
    pub store_timeout_ms: u64,

    /// Shared Redis store for a fleet of balancers. In-process store when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl StickinessConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for StickinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            store_timeout_ms: 50,
            redis_url: None,
        }
    }
}

/// Failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Retry against alternate servers after a reported failure.
    pub enabled: bool,

    /// Maximum number of retries per session.
    pub max_retries: u32,

    /// Delay before each retry in milliseconds.
    pub retry_delay_ms: u64,

    /// Upper bound for exponential backoff in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Delay growth between attempts.
    pub backoff: BackoffKind,

    /// Seconds of inactivity after which a session's failover state is forgotten.
    pub window_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
            backoff: BackoffKind::Linear,
            window_secs: 30,
        }
    }
}

/// Retry delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay between attempts.
    #[default]
    Linear,
    /// Doubling delay with jitter.
    Exponential,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
