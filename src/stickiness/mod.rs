//! Session stickiness subsystem.
//!
//! # Data Flow
//! ```text
//! FailoverCoordinator
//!     → get(session)            live binding?  → reuse bound server
//!     → set_if_absent(session)  after a fresh selection; loser adopts winner
//!     → delete_if(session, id)  on failure reports and stale bindings
//!     → delete_server           on server removal
//! ```
//!
//! # Design Decisions
//! - Backends are interchangeable behind [`StickinessStore`]
//! - A binding past its expiry is treated as absent
//! - Store errors and timeouts degrade to a cache miss in the coordinator

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::load_balancer::ServerId;

pub use memory::MemoryStickinessStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStickinessStore;

/// Errors raised by stickiness backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Session key → server id bindings with a time-to-live.
#[async_trait]
pub trait StickinessStore: Send + Sync {
    /// Live binding for `session_key`, if any.
    async fn get(&self, session_key: &str) -> Result<Option<ServerId>, StoreError>;

    /// Create or overwrite a binding.
    async fn set(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Bind `session_key` unless a live binding already exists.
    ///
    /// Returns the id that ends up bound: `server_id` if this call won,
    /// otherwise the existing binding.
    async fn set_if_absent(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<ServerId, StoreError>;

    /// Remove a binding. Returns whether one existed.
    async fn delete(&self, session_key: &str) -> Result<bool, StoreError>;

    /// Remove the binding only while it still points at `server_id`.
    /// Returns whether it was removed.
    async fn delete_if(&self, session_key: &str, server_id: &ServerId) -> Result<bool, StoreError>;

    /// Remove every binding pointing at `server_id`. Returns how many.
    async fn delete_server(&self, server_id: &ServerId) -> Result<usize, StoreError>;
}
