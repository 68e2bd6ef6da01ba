//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (balancerd):
//!     Load config → Validate → Build balancer → Seed servers → Spawn tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast to tasks → Wait for drain → Abort stragglers
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every long-running task subscribes to one broadcast channel
//! - Shutdown has a grace period; tasks still running after it are aborted

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
