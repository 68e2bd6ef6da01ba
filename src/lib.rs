//! Backend load balancer core.
//!
//! Tracks a pool of backend servers, probes their health with hysteresis,
//! picks a server per request with a pluggable algorithm, keeps sessions
//! sticky to their server, and fails over to untried servers when a caller
//! reports a failure.

pub mod admin;
pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod stickiness;

pub use balancer::{LoadBalancer, LoadBalancerBuilder, ServerStats, Stats};
pub use config::LoadBalancerConfig;
pub use error::{BalancerError, Result};
pub use lifecycle::Shutdown;
pub use load_balancer::{HealthStatus, Server, ServerId};
