//! Default durations used by the connection supervisor.

use std::time::Duration;

/// Idle time after which a decoy connection is aborted
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for open connections to finish
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while draining connections on shutdown
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Idle timeout from a seconds setting, falling back to [`IDLE_TIMEOUT`]
pub fn idle_timeout_from_secs(secs: Option<u64>) -> Duration {
    secs.filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(IDLE_TIMEOUT)
}
