//! # Service Registry
//!
//! Binds decoy definitions from the configuration to running listeners.
//!
//! A [`Decoy`] holds the validated, immutable parameters of one emulated
//! service and builds a fresh [`Emulator`] per connection. Parameters are
//! captured when the registry is built; later configuration changes apply
//! on the next start.

pub mod mysql;
pub mod registry;

use crate::protocol::Emulator;
use std::net::SocketAddr;
use std::time::Duration;

pub use mysql::MySqlDecoy;
pub use registry::ServiceRegistry;

/// One configured decoy service
pub trait Decoy: Send + Sync + 'static {
    /// Module name, as used in settings keys
    fn name(&self) -> &'static str;

    /// Address the listener binds to
    fn bind_addr(&self) -> SocketAddr;

    fn idle_timeout(&self) -> Duration;

    /// Fresh protocol state machine for a connection from `peer`
    fn new_session(&self, peer: SocketAddr) -> Box<dyn Emulator>;
}
