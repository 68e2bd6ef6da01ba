//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. All errors are collected, not just the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{BalancerFileConfig, LoadBalancerConfig, ServerConfig};

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &BalancerFileConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = balancer_errors(&config.balancer);
    errors.extend(server_errors(&config.servers));

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the core balancer settings.
pub fn validate_balancer(config: &LoadBalancerConfig) -> Result<(), Vec<ValidationError>> {
    let errors = balancer_errors(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn balancer_errors(config: &LoadBalancerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let hc = &config.health_check;

    if hc.interval_ms == 0 {
        errors.push(ValidationError::new("health_check.interval_ms", "must be greater than 0"));
    }
    if hc.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be greater than 0"));
    }
    if hc.interval_ms > 0 && hc.timeout_ms >= hc.interval_ms {
        errors.push(ValidationError::new(
            "health_check.timeout_ms",
            "must be shorter than health_check.interval_ms",
        ));
    }
    if hc.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health_check.unhealthy_threshold", "must be at least 1"));
    }
    if hc.healthy_threshold == 0 {
        errors.push(ValidationError::new("health_check.healthy_threshold", "must be at least 1"));
    }
    if hc.max_concurrent_probes == 0 {
        errors.push(ValidationError::new("health_check.max_concurrent_probes", "must be at least 1"));
    }
    if !hc.path.starts_with('/') {
        errors.push(ValidationError::new("health_check.path", "must start with '/'"));
    }

    let sticky = &config.session_stickiness;
    if sticky.enabled && sticky.ttl_seconds == 0 {
        errors.push(ValidationError::new(
            "session_stickiness.ttl_seconds",
            "must be greater than 0 when stickiness is enabled",
        ));
    }
    if sticky.enabled && sticky.store_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "session_stickiness.store_timeout_ms",
            "must be greater than 0 when stickiness is enabled",
        ));
    }

    let failover = &config.failover;
    if failover.max_retry_delay_ms < failover.retry_delay_ms {
        errors.push(ValidationError::new(
            "failover.max_retry_delay_ms",
            "must not be smaller than failover.retry_delay_ms",
        ));
    }
    if failover.enabled && failover.window_secs == 0 {
        errors.push(ValidationError::new("failover.window_secs", "must be greater than 0"));
    }

    errors
}

fn server_errors(servers: &[ServerConfig]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, server) in servers.iter().enumerate() {
        let field = |name: &str| format!("servers[{}].{}", i, name);
        if server.id.trim().is_empty() {
            errors.push(ValidationError::new(field("id"), "must not be empty"));
        } else if !seen.insert(server.id.as_str()) {
            errors.push(ValidationError::new(
                field("id"),
                format!("duplicate server id '{}'", server.id),
            ));
        }
        if server.host.trim().is_empty() {
            errors.push(ValidationError::new(field("host"), "must not be empty"));
        }
        if server.weight == 0 {
            errors.push(ValidationError::new(field("weight"), "must be at least 1"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, weight: u32) -> ServerConfig {
        ServerConfig {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            weight,
            metadata: Default::default(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BalancerFileConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = BalancerFileConfig::default();
        config.balancer.health_check.unhealthy_threshold = 0;
        config.balancer.health_check.healthy_threshold = 0;
        config.servers = vec![server("a", 1), server("a", 0)];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"health_check.unhealthy_threshold"));
        assert!(fields.contains(&"health_check.healthy_threshold"));
        assert!(fields.contains(&"servers[1].id"));
        assert!(fields.contains(&"servers[1].weight"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn timeout_must_fit_in_interval() {
        let mut config = LoadBalancerConfig::default();
        config.health_check.interval_ms = 1_000;
        config.health_check.timeout_ms = 1_000;
        let errors = validate_balancer(&config).unwrap_err();
        assert_eq!(errors[0].field, "health_check.timeout_ms");
    }

    #[test]
    fn zero_ttl_only_matters_when_sticky() {
        let mut config = LoadBalancerConfig::default();
        config.session_stickiness.ttl_seconds = 0;
        assert!(validate_balancer(&config).is_err());

        config.session_stickiness.enabled = false;
        assert!(validate_balancer(&config).is_ok());
    }
}
