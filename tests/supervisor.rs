//! Loopback tests for the connection supervisor and service registry

#![allow(clippy::expect_used, clippy::unwrap_used)]

use futures::{SinkExt, StreamExt};
use honeypotd::core::packet::Packet;
use honeypotd::event::{ChannelSink, LogEvent, LOGIN_ATTEMPT};
use honeypotd::protocol::mysql::{
    AUTH_PLUGIN, DEFAULT_BANNER, ERROR_SEQUENCE_ID, ERR_CODE_ACCESS_DENIED, ERR_CODE_PKT_ORDER,
};
use honeypotd::service::{Decoy, MySqlDecoy, ServiceRegistry};
use honeypotd::transport::connect;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start(idle: Duration) -> (ServiceRegistry, SocketAddr, UnboundedReceiver<LogEvent>) {
    let (sink, rx) = ChannelSink::new();
    let decoy = MySqlDecoy::new("127.0.0.1:0".parse().unwrap(), DEFAULT_BANNER, idle);
    let mut registry = ServiceRegistry::with_decoys(
        vec![Arc::new(decoy) as Arc<dyn Decoy>],
        Arc::new(sink),
        Some("decoy-test".to_string()),
    );
    let bound = registry.start().await;
    assert_eq!(bound.len(), 1);
    (registry, bound[0].1, rx)
}

fn handshake_response(username: &str, auth: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8; 32];
    payload[..4].copy_from_slice(&[0x85, 0xa6, 0x03, 0x00]);
    payload.extend_from_slice(username.as_bytes());
    payload.push(0);
    payload.push(auth.len() as u8);
    payload.extend_from_slice(auth);
    payload.extend_from_slice(AUTH_PLUGIN);
    payload.push(0);
    payload
}

fn error_code(packet: &Packet) -> u16 {
    u16::from_le_bytes([packet.payload[1], packet.payload[2]])
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut frame = header.to_vec();
    frame.resize(4 + len, 0);
    stream.read_exact(&mut frame[4..]).await.unwrap();
    frame
}

/// Read until the peer closes; `true` for FIN, `false` for RST
async fn read_to_close(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
}

#[tokio::test]
async fn test_credentials_are_captured_and_denied() {
    let (registry, addr, mut events) = start(Duration::from_secs(5)).await;
    let mut client = connect(addr).await.unwrap();

    let greeting = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(greeting.sequence_id, 0);

    client
        .send(Packet::new(1, handshake_response("root", &[0xca, 0xfe, 0xba, 0xbe])))
        .await
        .unwrap();

    let reply = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply.sequence_id, ERROR_SEQUENCE_ID);
    assert_eq!(error_code(&reply), ERR_CODE_ACCESS_DENIED);
    assert_eq!(&reply.payload[4..9], b"28000");
    let message = String::from_utf8(reply.payload[9..].to_vec()).unwrap();
    assert_eq!(
        message,
        "Access denied for user 'root'@'127.0.0.1' (using password: YES)"
    );

    let closed = timeout(WAIT, client.next()).await.unwrap();
    assert!(closed.is_none());

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.event_kind, LOGIN_ATTEMPT);
    assert_eq!(event.service, "mysql");
    assert_eq!(event.node_id.as_deref(), Some("decoy-test"));
    assert_eq!(event.local_port, addr.port());
    assert_eq!(event.fields["username"], Value::from("root"));
    assert_eq!(event.fields["password"], Value::from("cafebabe"));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_wrong_sequence_header_gets_error_then_close() {
    let (registry, addr, mut events) = start(Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _greeting = timeout(WAIT, read_frame(&mut stream)).await.unwrap();

    // Header only: the payload never arrives
    stream.write_all(&[0x20, 0x00, 0x00, 0x02]).await.unwrap();

    let reply = timeout(WAIT, read_frame(&mut stream)).await.unwrap();
    let packet = Packet::from_bytes(&reply).unwrap();
    assert_eq!(packet.sequence_id, ERROR_SEQUENCE_ID);
    assert_eq!(error_code(&packet), ERR_CODE_PKT_ORDER);
    assert_eq!(&packet.payload[4..9], b"08S01");

    assert!(timeout(WAIT, read_to_close(&mut stream)).await.unwrap());
    assert!(events.try_recv().is_err());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_split_auth_packet_is_reassembled() {
    let (registry, addr, mut events) = start(Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _greeting = timeout(WAIT, read_frame(&mut stream)).await.unwrap();

    let frame = Packet::new(1, handshake_response("sa", b"x")).to_bytes().unwrap();
    let (head, tail) = frame.split_at(6);
    stream.write_all(head).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(tail).await.unwrap();

    let reply = timeout(WAIT, read_frame(&mut stream)).await.unwrap();
    assert_eq!(error_code(&Packet::from_bytes(&reply).unwrap()), ERR_CODE_ACCESS_DENIED);

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.fields["username"], Value::from("sa"));
    assert_eq!(event.fields["password"], Value::from("78"));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_is_reset() {
    let (registry, addr, mut events) = start(Duration::from_millis(200)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _greeting = timeout(WAIT, read_frame(&mut stream)).await.unwrap();

    let orderly = timeout(WAIT, read_to_close(&mut stream)).await.unwrap();
    assert!(!orderly, "idle connection should be reset, not closed");
    assert!(events.try_recv().is_err());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_connections_are_independent() {
    let (registry, addr, mut events) = start(Duration::from_secs(5)).await;

    let mut clients = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let mut client = connect(addr).await.unwrap();
        let greeting = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        clients.push((name, client, greeting));
    }

    let mut thread_ids: Vec<_> = clients
        .iter()
        .map(|(_, _, greeting)| {
            let at = 1 + DEFAULT_BANNER.len() + 1;
            greeting.payload[at..at + 4].to_vec()
        })
        .collect();
    thread_ids.dedup();
    assert_eq!(thread_ids.len(), 3);

    for (name, client, _) in clients.iter_mut().rev() {
        client
            .send(Packet::new(1, handshake_response(name, b"pw")))
            .await
            .unwrap();
        let reply = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(error_code(&reply), ERR_CODE_ACCESS_DENIED);
    }

    let mut users = Vec::new();
    for _ in 0..3 {
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        users.push(event.fields["username"].as_str().unwrap().to_string());
    }
    users.sort();
    assert_eq!(users, vec!["alice", "bob", "carol"]);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (registry, addr, _events) = start(Duration::from_secs(5)).await;
    registry.shutdown().await;

    let refused = timeout(WAIT, TcpStream::connect(addr)).await.unwrap();
    assert!(refused.is_err());
}
