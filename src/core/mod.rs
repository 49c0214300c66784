//! # Core Wire Components
//!
//! Low-level packet framing for the emulated services.
//!
//! ## Components
//! - **Packet**: length-prefixed frame with a sequence id, plus the
//!   non-mutating [`packet::try_consume`] used by the per-connection state machines
//! - **Codec**: Tokio codec over the same framing for framed readers and writers
//!
//! ## Wire Format
//! ```text
//! [Length(3, LE)] [Sequence(1)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum payload size: 2^24 - 1 bytes (the width of the length prefix)
//! - Length is read from the header before any payload is sliced

pub mod codec;
pub mod packet;
