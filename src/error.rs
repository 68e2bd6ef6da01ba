//! Error types for the balancer core.

use thiserror::Error;

use crate::load_balancer::server::ServerId;

/// Errors returned by registry, selection and failover operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalancerError {
    /// A server with this id is already registered.
    #[error("server '{0}' is already registered")]
    DuplicateId(ServerId),

    /// Weight must be at least 1.
    #[error("server '{id}' has invalid weight 0")]
    InvalidWeight { id: ServerId },

    /// No server with this id is registered.
    #[error("server '{0}' not found")]
    NotFound(ServerId),

    /// The healthy set is empty.
    #[error("no healthy servers available")]
    NoHealthyServers,

    /// Every retry was consumed without finding a usable server.
    #[error("failover exhausted after trying {tried:?}")]
    FailoverExhausted { tried: Vec<ServerId> },

    /// The stickiness backend failed or timed out.
    #[error("stickiness store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid configuration supplied at construction.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BalancerError {
    /// True for the conditions a request-serving caller has to handle
    /// ("cannot serve this request right now").
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BalancerError::NoHealthyServers | BalancerError::FailoverExhausted { .. }
        )
    }
}

/// Result type for balancer operations.
pub type Result<T> = std::result::Result<T, BalancerError>;
