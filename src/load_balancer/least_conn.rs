//! Least Connections load balancing strategy.
//!
//! The balancer does not see connections, so the last probe response time
//! stands in as the load signal.

use crate::load_balancer::{Selector, Server};

/// Least connections selector.
/// Selects the server with the lowest last response time.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn next_server<'a>(&self, healthy: &[&'a Server], _key: &str) -> Option<&'a Server> {
        // Ties go to the lowest id
        healthy
            .iter()
            .min_by(|a, b| {
                a.health
                    .last_response_time_ms
                    .cmp(&b.health.last_response_time_ms)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .copied()
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}
