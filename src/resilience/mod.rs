//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! get_server(session):
//!     → sticky binding (store call bounded by store_timeout)
//!     → selection excluding servers already tried for the session
//! report_failure(session, server):
//!     → failover.rs (record tried id, schedule retry)
//!     → backoff.rs (delay before the next selection)
//! ```
//!
//! # Design Decisions
//! - A slow or failing stickiness store degrades to fresh selection
//! - Retries are bounded by `max_retries` and the caller's deadline
//! - Failover state is per session and forgotten after `window_secs`

pub mod backoff;
pub mod failover;

pub use failover::FailoverCoordinator;
