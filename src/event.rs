//! # Decoy Events
//!
//! Structured records of attacker interaction, kept apart from diagnostic
//! logging. The core guarantees emission only; storage and alerting
//! subscribe through an [`EventSink`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Tracing target carrying decoy events
pub const EVENT_TARGET: &str = "honeypotd::event";

/// Event kind for captured credentials
pub const LOGIN_ATTEMPT: &str = "login_attempt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub event_kind: String,
    pub service: String,
    pub node_id: Option<String>,
    pub peer_addr: SocketAddr,
    pub local_port: u16,
    pub timestamp_ms: u64,
    pub fields: BTreeMap<String, Value>,
}

impl LogEvent {
    pub fn new(
        event_kind: impl Into<String>,
        service: impl Into<String>,
        peer_addr: SocketAddr,
        local_port: u16,
    ) -> Self {
        Self {
            event_kind: event_kind.into(),
            service: service.into(),
            node_id: None,
            peer_addr,
            local_port,
            timestamp_ms: now_millis(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_node_id(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, Value>) -> Self {
        self.fields.extend(fields);
        self
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Destination for decoy events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Writes each event as one structured `info` record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(
                target: EVENT_TARGET,
                event_kind = %event.event_kind,
                service = %event.service,
                peer = %event.peer_addr,
                event = %json,
                "Decoy event"
            ),
            Err(e) => error!(error = %e, "Failed to serialize decoy event"),
        }
    }
}

/// Forwards events to an in-process subscriber
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LogEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let peer: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        sink.emit(LogEvent::new(LOGIN_ATTEMPT, "mysql", peer, 3306));
        sink.emit(LogEvent::new("scan", "mysql", peer, 3306));
        assert_eq!(rx.try_recv().unwrap().event_kind, LOGIN_ATTEMPT);
        assert_eq!(rx.try_recv().unwrap().event_kind, "scan");
    }

    #[test]
    fn event_serializes_fields_sorted() {
        let peer: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("username".to_string(), json!("root"));
        fields.insert("password".to_string(), Value::Null);
        let event = LogEvent::new(LOGIN_ATTEMPT, "mysql", peer, 3306)
            .with_node_id(Some("node-a".into()))
            .with_fields(fields);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["peer_addr"], json!("10.1.2.3:5555"));
        assert_eq!(value["node_id"], json!("node-a"));
        assert_eq!(value["fields"]["username"], json!("root"));
        assert!(value["fields"]["password"].is_null());
    }
}
