//! Observability and Metrics
//!
//! Counters for decoy activity across all listeners.
//!
//! Uses atomic counters for thread-safe metrics collection.

use crate::protocol::CloseReason;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for decoy connections
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Credentials captured
    pub login_attempts: AtomicU64,
    /// Connections closed for breaking message order
    pub protocol_violations: AtomicU64,
    /// Connections closed on unparseable input
    pub malformed_inputs: AtomicU64,
    /// Connections aborted after going idle
    pub idle_timeouts: AtomicU64,
    /// Total bytes received from clients
    pub bytes_received: AtomicU64,
    /// Total bytes sent to clients
    pub bytes_sent: AtomicU64,
    /// Accept and socket errors
    pub connection_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            login_attempts: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            malformed_inputs: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record why a decoy closed a connection
    pub fn decoy_closed(&self, reason: CloseReason) {
        let counter = match reason {
            CloseReason::CredentialsCaptured => &self.login_attempts,
            CloseReason::ProtocolViolation => &self.protocol_violations,
            CloseReason::MalformedInput => &self.malformed_inputs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an idle abort
    pub fn idle_timeout(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_in(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_out(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            login_attempts: self.login_attempts.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            malformed_inputs: self.malformed_inputs.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            login_attempts = snapshot.login_attempts,
            protocol_violations = snapshot.protocol_violations,
            malformed_inputs = snapshot.malformed_inputs,
            idle_timeouts = snapshot.idle_timeouts,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Decoy metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub login_attempts: u64,
    pub protocol_violations: u64,
    pub malformed_inputs: u64,
    pub idle_timeouts: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reasons_land_in_their_counters() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.decoy_closed(CloseReason::CredentialsCaptured);
        metrics.decoy_closed(CloseReason::ProtocolViolation);
        metrics.decoy_closed(CloseReason::ProtocolViolation);
        metrics.connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 1);
        assert_eq!(snap.connections_active, 0);
        assert_eq!(snap.login_attempts, 1);
        assert_eq!(snap.protocol_violations, 2);
        assert_eq!(snap.malformed_inputs, 0);
    }
}
