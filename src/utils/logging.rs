//! Diagnostic logging setup.
//!
//! `RUST_LOG` takes precedence over the level passed in. Decoy events are
//! logged on [`crate::event::EVENT_TARGET`] and can be filtered separately,
//! e.g. `RUST_LOG=warn,honeypotd::event=info`.

use crate::error::{HoneypotError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
pub fn init(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| HoneypotError::Custom(format!("Invalid log level '{level}': {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| HoneypotError::Custom(format!("Failed to install logger: {e}")))
}
