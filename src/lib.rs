//! # honeypotd
//!
//! Decoy network services that impersonate real servers closely enough to
//! collect credentials from automated and manual attackers, without ever
//! granting access.
//!
//! ## Layers
//! - [`config`]: validated, persisted settings for every decoy and the device
//! - [`core`]: wire framing shared by the binary protocol emulators
//! - [`protocol`]: per-connection state machines (MySQL so far)
//! - [`transport`]: the TCP connection supervisor
//! - [`service`]: the registry binding configured decoys to listeners
//! - [`event`]: structured capture events and their sinks
//!
//! ## Example
//! ```rust,no_run
//! use honeypotd::config::{default_search_paths, Config, ConfigHandle};
//! use honeypotd::event::TracingSink;
//! use honeypotd::service::ServiceRegistry;
//! use std::sync::Arc;
//!
//! # async fn run() -> honeypotd::error::Result<()> {
//! let config = ConfigHandle::new(Config::load(&default_search_paths())?);
//! let mut registry = ServiceRegistry::from_config(&config, Arc::new(TracingSink))?;
//! registry.start().await;
//! tokio::signal::ctrl_c().await?;
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{Config, ConfigHandle, Submission};
pub use error::{HoneypotError, Result, ValidationError};
