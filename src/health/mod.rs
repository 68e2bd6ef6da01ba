//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each server (probe.rs), bounded parallelism and deadline
//!     → Fold outcome through state.rs
//!     → registry.update_health + audit event on transition
//! ```
//!
//! # Design Decisions
//! - The checker is the only writer of health state
//! - State transitions require consecutive successes/failures
//! - Probe failures are state, never errors returned to selection callers

pub mod active;
pub mod probe;
pub mod state;

pub use active::HealthMonitor;
pub use probe::{HttpProbe, Probe, ProbeGauges, ProbeOutcome};
pub use state::{apply_outcome, Thresholds, Transition};
