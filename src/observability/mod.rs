//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry / health checker / coordinator produce:
//!     → audit.rs (structured events for the host's audit sink)
//!     → metrics.rs (counters, gauges)
//!     → logging.rs (tracing subscriber)
//! ```
//!
//! # Design Decisions
//! - Audit sink is a trait; the core never knows where events end up
//! - Metrics are cheap (atomic increments behind the `metrics` facade)

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, NoopAuditSink, TracingAuditSink};
