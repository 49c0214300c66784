//! MySQL server emulation.
//!
//! Sends a protocol-10 handshake, waits for the client's handshake response
//! at sequence id 1, records the username and scrambled password, and answers
//! with the same access-denied error a real server would.
//!
//! Reference layouts: `Protocol::Handshake`, `Protocol::HandshakeResponse41`
//! and `ERR_Packet` from the MySQL client/server protocol documentation.

use super::{Capture, CloseReason, Emulator, Step};
use crate::core::packet::{self, Consumed, Packet};
use crate::error::{constants, HoneypotError, Result};
use crate::event::LOGIN_ATTEMPT;
use bytes::{Buf, BytesMut};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const SERVICE_NAME: &str = "mysql";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_BANNER: &str = "5.5.43-0ubuntu0.14.04.1";

pub const PROTOCOL_VERSION: u8 = 0x0a;
pub const AUTH_PLUGIN: &[u8] = b"mysql_native_password";

pub const ERR_CODE_ACCESS_DENIED: u16 = 1045;
pub const ERR_CODE_PKT_ORDER: u16 = 1156;
pub const ERR_CODE_HANDSHAKE: u16 = 1043;
pub const SQL_STATE_ACCESS_DENIED: &[u8; 5] = b"28000";
pub const SQL_STATE_PKT_ORDER: &[u8; 5] = b"08S01";
pub const SQL_STATE_HANDSHAKE: &[u8; 5] = b"08S01";

/// Sequence id of the client's handshake response
pub const AUTH_SEQUENCE_ID: u8 = 1;

/// Sequence id used for every error frame the decoy sends
pub const ERROR_SEQUENCE_ID: u8 = 2;

/// Capability flags, charset and status: protocol 4.1, secure connection, plugin auth
const CAPABILITIES_LOW: [u8; 2] = [0xff, 0xf7];
const CHARSET_LATIN1: u8 = 0x08;
const STATUS_AUTOCOMMIT: [u8; 2] = [0x02, 0x00];
const CAPABILITIES_HIGH: [u8; 2] = [0x0f, 0x80];
const AUTH_DATA_LEN: u8 = 0x15;
const RESERVED_LEN: usize = 10;

const SALT_HEAD_LEN: usize = 8;
const SALT_TAIL_LEN: usize = 12;

/// capability flags (4) + max packet size (4) + charset (1) + reserved (23)
const USERNAME_OFFSET: usize = 4 + 4 + 1 + 23;

static BANNER_PATTERN: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[3456]\.[-_~.+\w]+$"));

/// Refuse banners that do not look like a MySQL server version
pub fn validate_banner(banner: &str) -> Result<()> {
    let pattern = BANNER_PATTERN
        .as_ref()
        .map_err(|e| HoneypotError::Custom(e.to_string()))?;
    if pattern.is_match(banner) {
        Ok(())
    } else {
        Err(HoneypotError::InvalidBanner {
            service: SERVICE_NAME,
            banner: banner.to_string(),
        })
    }
}

/// Per-listener source of MySQL connection ("thread") ids
///
/// Starts at a random low value and advances by a small random step, so
/// consecutive connections see plausible, increasing ids.
#[derive(Debug)]
pub struct ThreadIdAllocator {
    last: AtomicU32,
}

impl ThreadIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(rand::rng().random_range(0..=0x0FFF))
    }

    pub fn starting_at(start: u32) -> Self {
        Self {
            last: AtomicU32::new(start),
        }
    }

    pub fn next_id(&self) -> u32 {
        let step = rand::rng().random_range(1..=5);
        self.last.fetch_add(step, Ordering::Relaxed).wrapping_add(step)
    }
}

impl Default for ThreadIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Username and hex-encoded auth response from a handshake response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Extract credentials from a `HandshakeResponse41` payload
///
/// Returns `None` when the payload does not carry a NUL-terminated, non-empty
/// username followed by an auth-response length byte.
pub fn parse_auth(payload: &[u8]) -> Option<Credentials> {
    let tail = payload.get(USERNAME_OFFSET..)?;
    let end = USERNAME_OFFSET + tail.iter().position(|&b| b == 0)?;
    let username = &payload[USERNAME_OFFSET..end];
    if username.is_empty() {
        return None;
    }

    let mut i = end + 1;
    let auth_len = usize::from(*payload.get(i)?);
    i += 1;

    let auth = &payload[i.min(payload.len())..(i + auth_len).min(payload.len())];
    let password = (!auth.is_empty()).then(|| hex::encode(auth));

    Some(Credentials {
        username: String::from_utf8_lossy(username).into_owned(),
        password,
    })
}

/// Encode an `ERR_Packet`
pub fn error_packet(code: u16, sql_state: &[u8; 5], message: &str) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(9 + message.len());
    data.push(0xff);
    data.extend_from_slice(&code.to_le_bytes());
    data.push(b'#');
    data.extend_from_slice(sql_state);
    data.extend_from_slice(message.as_bytes());
    Packet::new(ERROR_SEQUENCE_ID, data).to_bytes()
}

fn random_salt<const N: usize>() -> [u8; N] {
    let mut rng = rand::rng();
    let mut salt = [0u8; N];
    for b in salt.iter_mut() {
        *b = rng.random_range(0x21..=0x7e);
    }
    salt
}

/// Encode the initial `Protocol::Handshake` at sequence id 0
pub fn greeting_packet(banner: &str, thread_id: u32) -> Result<Vec<u8>> {
    let salt_head: [u8; SALT_HEAD_LEN] = random_salt();
    let salt_tail: [u8; SALT_TAIL_LEN] = random_salt();

    let mut data = Vec::with_capacity(banner.len() + 80);
    data.push(PROTOCOL_VERSION);
    data.extend_from_slice(banner.as_bytes());
    data.push(0x00);
    data.extend_from_slice(&thread_id.to_le_bytes());
    data.extend_from_slice(&salt_head);
    data.push(0x00);
    data.extend_from_slice(&CAPABILITIES_LOW);
    data.push(CHARSET_LATIN1);
    data.extend_from_slice(&STATUS_AUTOCOMMIT);
    data.extend_from_slice(&CAPABILITIES_HIGH);
    data.push(AUTH_DATA_LEN);
    data.extend_from_slice(&[0u8; RESERVED_LEN]);
    data.extend_from_slice(&salt_tail);
    data.push(0x00);
    data.extend_from_slice(AUTH_PLUGIN);
    data.push(0x00);
    Packet::new(0, data).to_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Connected, greeting not yet sent
    AwaitingGreetingAck,
    /// Greeting sent, expecting the handshake response at sequence id 1
    AwaitingAuth,
    /// Decoy has decided to close
    Terminal,
}

/// One emulated MySQL connection
#[derive(Debug)]
pub struct MySqlSession {
    banner: Arc<str>,
    thread_id: u32,
    peer: SocketAddr,
    state: State,
}

impl MySqlSession {
    pub fn new(banner: Arc<str>, thread_id: u32, peer: SocketAddr) -> Self {
        Self {
            banner,
            thread_id,
            peer,
            state: State::AwaitingGreetingAck,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    fn access_denied(&self, credentials: &Credentials) -> Result<Vec<u8>> {
        let using = if credentials.password.is_some() { "YES" } else { "NO" };
        let message = format!(
            "Access denied for user '{}'@'{}' (using password: {using})",
            credentials.username,
            self.peer.ip()
        );
        error_packet(ERR_CODE_ACCESS_DENIED, SQL_STATE_ACCESS_DENIED, &message)
    }
}

impl Emulator for MySqlSession {
    fn greeting(&mut self) -> Result<Vec<u8>> {
        let bytes = greeting_packet(&self.banner, self.thread_id)?;
        self.state = State::AwaitingAuth;
        Ok(bytes)
    }

    fn on_data(&mut self, buffer: &mut BytesMut) -> Result<Step> {
        if self.state != State::AwaitingAuth {
            return Ok(Step::wait());
        }

        let (sequence_id, frame) = match packet::try_consume(buffer) {
            Consumed::Incomplete => return Ok(Step::wait()),
            Consumed::Partial { sequence_id } => (sequence_id, None),
            Consumed::Complete {
                sequence_id,
                payload,
                consumed,
            } => (sequence_id, Some((payload.to_vec(), consumed))),
        };

        // The header alone is enough to reject an out-of-order packet
        if sequence_id != AUTH_SEQUENCE_ID {
            debug!(peer = %self.peer, sequence_id, "Packet out of order");
            self.state = State::Terminal;
            let reply = error_packet(
                ERR_CODE_PKT_ORDER,
                SQL_STATE_PKT_ORDER,
                constants::ERR_PACKETS_OUT_OF_ORDER,
            )?;
            return Ok(Step::close(reply, CloseReason::ProtocolViolation));
        }

        let Some((payload, consumed)) = frame else {
            return Ok(Step::wait());
        };
        buffer.advance(consumed);
        self.state = State::Terminal;

        let Some(credentials) = parse_auth(&payload) else {
            debug!(peer = %self.peer, len = payload.len(), "Malformed handshake response");
            let reply = error_packet(
                ERR_CODE_HANDSHAKE,
                SQL_STATE_HANDSHAKE,
                constants::ERR_BAD_HANDSHAKE,
            )?;
            return Ok(Step::close(reply, CloseReason::MalformedInput));
        };

        let mut fields = BTreeMap::new();
        fields.insert("username".to_string(), Value::from(credentials.username.clone()));
        fields.insert(
            "password".to_string(),
            credentials.password.clone().map_or(Value::Null, Value::from),
        );

        let reply = self.access_denied(&credentials)?;
        Ok(Step::close(reply, CloseReason::CredentialsCaptured).with_capture(Capture {
            event_kind: LOGIN_ATTEMPT,
            fields,
        }))
    }

    fn is_terminal(&self) -> bool {
        self.state == State::Terminal
    }
}
