//! # Utility Modules
//!
//! Supporting utilities for logging, timing and observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup for the binary
//! - **Metrics**: Thread-safe counters for connections and captures
//! - **Timeout**: Default durations for idle connections and shutdown

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
