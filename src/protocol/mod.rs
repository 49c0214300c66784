//! # Protocol Emulation
//!
//! Per-connection state machines that impersonate a real service.
//!
//! An [`Emulator`] is sans-I/O: the connection supervisor feeds it the
//! connection's receive buffer and writes whatever it returns. One instance
//! exists per accepted connection and is only touched by that connection's
//! task, so it needs no internal locking.

pub mod mysql;

use crate::error::Result;
use bytes::BytesMut;
use serde_json::Value;
use std::collections::BTreeMap;

/// Why a decoy ended a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Credentials were captured and refused
    CredentialsCaptured,
    /// The client broke the expected message order
    ProtocolViolation,
    /// A message arrived that could not be parsed
    MalformedInput,
}

/// Something worth logging, without connection metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub event_kind: &'static str,
    pub fields: BTreeMap<String, Value>,
}

/// Result of one dispatch into an emulator
#[derive(Debug, Default)]
pub struct Step {
    /// Bytes to write before anything else happens
    pub reply: Vec<u8>,
    pub capture: Option<Capture>,
    /// Close after writing `reply`
    pub close: Option<CloseReason>,
    /// A message was consumed from the buffer
    pub progressed: bool,
}

impl Step {
    /// Nothing to do until more bytes arrive
    pub fn wait() -> Self {
        Self::default()
    }

    pub fn close(reply: Vec<u8>, reason: CloseReason) -> Self {
        Self {
            reply,
            capture: None,
            close: Some(reason),
            progressed: true,
        }
    }

    pub fn with_capture(mut self, capture: Capture) -> Self {
        self.capture = Some(capture);
        self
    }
}

/// A per-connection protocol state machine
pub trait Emulator: Send {
    /// Bytes sent as soon as the connection is accepted
    fn greeting(&mut self) -> Result<Vec<u8>>;

    /// Interpret at most one message from `buffer`
    ///
    /// Consumed bytes are removed from `buffer`; bytes of an incomplete
    /// message stay in place for the next call.
    fn on_data(&mut self, buffer: &mut BytesMut) -> Result<Step>;

    fn is_terminal(&self) -> bool;
}
