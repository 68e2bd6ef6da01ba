//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerFileConfig (validated, immutable)
//!     → LoadBalancerConfig handed to LoadBalancer::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a change means building a new balancer
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, Algorithm, BackoffKind, BalancerFileConfig, FailoverConfig, HealthCheckConfig,
    LoadBalancerConfig, ObservabilityConfig, ServerConfig, StickinessConfig,
};
