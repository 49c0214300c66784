//! # Transport Layer
//!
//! Socket handling for the decoys. Only TCP is needed by the emulated
//! services so far.

pub mod tcp;

pub use tcp::{connect, Supervisor};
