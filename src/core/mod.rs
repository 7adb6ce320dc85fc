//! Core module - host metrics collection
//!
//! The rest of the crate's shared state lives in `agent` (session/event
//! plumbing) and `sandbox` (execution backends); this module holds only the
//! host CPU/memory snapshot collector the control loop's Observing step
//! reads from.

pub mod metrics;

pub use metrics::{MetricsCollector, MetricsManager, SessionMetrics, SystemSnapshot};
