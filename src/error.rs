//! # Error Types
//!
//! Error handling for the decoy platform.
//!
//! ## Error Categories
//! - **Startup**: no readable configuration file ([`HoneypotError::ConfigNotFound`]), fatal
//! - **Validation**: one rejected settings key ([`ValidationError`]), reported back in bulk
//! - **Persistence**: the snapshot could not be written; the in-memory copy stays authoritative
//! - **Protocol**: violations and malformed input scoped to a single connection
//!
//! Anything raised while serving one connection is absorbed by that connection's
//! task; anything raised while validating one settings key is collected next to
//! the others instead of aborting the batch.
//!
//! ## Example Usage
//! ```rust
//! use honeypotd::config::Config;
//! use honeypotd::error::HoneypotError;
//! use serde_json::json;
//!
//! let mut config = Config::from_value(json!({ "mysql.enabled": true, "mysql.port": 3306 })).unwrap();
//! match config.set_val("mysql.port", json!(70000)) {
//!     Err(err) => assert_eq!(err.key, "mysql.port"),
//!     Ok(()) => unreachable!(),
//! }
//! assert!(matches!(config.get("nope", None), Err(HoneypotError::MissingKey(_))));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Config engine messages
    pub const ERR_LOCK_POISONED: &str = "Configuration lock poisoned";
    pub const ERR_NOT_AN_OBJECT: &str = "Configuration root must be a JSON object";
    pub const ERR_NO_BACKING_FILE: &str = "Configuration has no backing file";

    /// Validation messages
    pub const ERR_NOT_BOOLEAN: &str = "Boolean setting is not True or False";
    pub const ERR_INVALID_PORT: &str = "Invalid port number";
    pub const ERR_INVALID_TIMEOUT: &str = "Invalid timeout in seconds";
    pub const ERR_NOT_A_STRING: &str = "Setting must be a string";
    pub const ERR_NAME_TOO_LONG: &str = "Name cannot be longer than 100 characters";
    pub const ERR_NAME_TOO_SHORT: &str = "Name ought to be at least one character";
    pub const ERR_NAME_CHARSET: &str =
        "Please use only characters, digits, any of the following: + - # _";
    pub const ERR_DESC_CHARSET: &str =
        "Please use only characters, digits, spaces and any of the following: + - # _";
    pub const ERR_PORT_CONFLICT: &str = "More than one service uses this port";

    /// Wire protocol messages
    pub const ERR_EMPTY_PACKET: &str = "Packet payload is empty";
    pub const ERR_PACKETS_OUT_OF_ORDER: &str = "Got packets out of order";
    pub const ERR_BAD_HANDSHAKE: &str = "Bad handshake";
}

/// HoneypotError is the primary error type for the decoy platform
#[derive(Error, Debug)]
pub enum HoneypotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No usable config file found (tried: {})", display_paths(.tried))]
    ConfigNotFound { tried: Vec<PathBuf> },

    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to persist configuration: {0}")]
    Persistence(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Malformed input")]
    MalformedInput,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Packet payload is empty")]
    EmptyPacket,

    #[error("Invalid banner for {service}: {banner}")]
    InvalidBanner { service: &'static str, banner: String },

    #[error("Configuration lock poisoned")]
    LockPoisoned,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Custom error: {0}")]
    Custom(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single rejected settings key.
///
/// Batch updates return a list of these; the keys they name were not merged,
/// every other key in the batch was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Type alias for Results using HoneypotError
pub type Result<T> = std::result::Result<T, HoneypotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_names_key() {
        let err = ValidationError::new("mysql.port", "Invalid port number (70000)");
        assert_eq!(err.to_string(), "mysql.port: Invalid port number (70000)");
    }

    #[test]
    fn not_found_lists_every_candidate() {
        let err = HoneypotError::ConfigNotFound {
            tried: vec![PathBuf::from("/etc/a.conf"), PathBuf::from("a.conf")],
        };
        assert_eq!(
            err.to_string(),
            "No usable config file found (tried: /etc/a.conf, a.conf)"
        );
    }
}
