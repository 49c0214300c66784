//! # TCP Connection Supervisor
//!
//! Accepts connections for one decoy and gives each its own emulator,
//! receive buffer and idle timer.
//!
//! ## Responsibilities
//! - Send the decoy's greeting on accept
//! - Feed received bytes to the emulator in arrival order, one dispatch at a time
//! - Write replies before closing when the emulator asks to close
//! - Abort (RST, no FIN) connections that stay idle past the decoy's timeout
//! - Keep every failure local to its connection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::core::codec::PacketCodec;
use crate::error::{HoneypotError, Result};
use crate::event::{EventSink, LogEvent};
use crate::protocol::{Capture, CloseReason};
use crate::service::Decoy;
use crate::utils::metrics::{global_metrics, Metrics};
use crate::utils::timeout::{SHUTDOWN_POLL_INTERVAL, SHUTDOWN_TIMEOUT};

const READ_BUFFER_SIZE: usize = 4096;

/// Runs the accept loop and per-connection tasks for one decoy
#[derive(Clone)]
pub struct Supervisor {
    decoy: Arc<dyn Decoy>,
    sink: Arc<dyn EventSink>,
    node_id: Option<String>,
    metrics: &'static Metrics,
}

impl Supervisor {
    pub fn new(decoy: Arc<dyn Decoy>, sink: Arc<dyn EventSink>, node_id: Option<String>) -> Self {
        Self {
            decoy,
            sink,
            node_id,
            metrics: global_metrics(),
        }
    }

    /// Accept connections until `shutdown_rx` fires, then wait for open ones
    #[instrument(skip_all, fields(service = self.decoy.name()))]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Decoy listening");

        // Track active connections
        let active_connections = Arc::new(Mutex::new(0u32));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down decoy. Waiting for connections to close...");

                    let deadline = tokio::time::sleep(SHUTDOWN_TIMEOUT);
                    tokio::pin!(deadline);

                    loop {
                        let connections = *active_connections.lock().await;
                        if connections == 0 {
                            info!("All connections closed, shutting down");
                            break;
                        }
                        tokio::select! {
                            _ = &mut deadline => {
                                warn!(connections = %connections, "Shutdown timeout reached, forcing exit");
                                break;
                            }
                            _ = tokio::time::sleep(SHUTDOWN_POLL_INTERVAL) => {
                                debug!(connections = %connections, "Waiting for connections to close");
                            }
                        }
                    }

                    return Ok(());
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "New connection");
                            let supervisor = self.clone();
                            let active_connections = active_connections.clone();

                            {
                                let mut count = active_connections.lock().await;
                                *count += 1;
                            }

                            tokio::spawn(async move {
                                supervisor.handle_connection(stream, peer, local_addr.port()).await;

                                let mut count = active_connections.lock().await;
                                *count -= 1;
                            });
                        }
                        Err(e) => {
                            self.metrics.connection_error();
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    /// Drive one accepted connection to completion
    ///
    /// Never fails: errors end this connection only.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, local_port: u16) {
        self.metrics.connection_established();

        match self.drive(stream, peer, local_port).await {
            Ok(Some(reason)) => {
                self.metrics.decoy_closed(reason);
                debug!(peer = %peer, ?reason, "Decoy closed connection");
            }
            Ok(None) => debug!(peer = %peer, "Peer closed connection"),
            Err(HoneypotError::ConnectionTimeout) => {
                self.metrics.idle_timeout();
                debug!(peer = %peer, "Idle timeout, connection aborted");
            }
            Err(e) => {
                self.metrics.connection_error();
                debug!(peer = %peer, error = %e, "Connection error");
            }
        }

        self.metrics.connection_closed();
    }

    async fn drive(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        local_port: u16,
    ) -> Result<Option<CloseReason>> {
        let mut session = self.decoy.new_session(peer);
        let idle = self.decoy.idle_timeout();

        let greeting = session.greeting()?;
        self.write(&mut stream, &greeting).await?;

        let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            let read = match timeout(idle, stream.read_buf(&mut buffer)).await {
                Ok(read) => read?,
                Err(_) => {
                    abort(stream);
                    return Err(HoneypotError::ConnectionTimeout);
                }
            };
            if read == 0 {
                return Ok(None);
            }
            self.metrics.bytes_in(read as u64);

            // Bytes that arrive while a message is handled wait in `buffer`
            // and are dispatched right after it.
            loop {
                let step = session.on_data(&mut buffer)?;
                if let Some(capture) = step.capture {
                    self.emit(capture, peer, local_port);
                }
                self.write(&mut stream, &step.reply).await?;

                if let Some(reason) = step.close {
                    if let Err(e) = stream.shutdown().await {
                        debug!(peer = %peer, error = %e, "Failed to shut down write half");
                    }
                    return Ok(Some(reason));
                }
                if !step.progressed || buffer.is_empty() {
                    break;
                }
            }
        }
    }

    async fn write(&self, stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        stream.write_all(bytes).await?;
        self.metrics.bytes_out(bytes.len() as u64);
        Ok(())
    }

    fn emit(&self, capture: Capture, peer: SocketAddr, local_port: u16) {
        let event = LogEvent::new(capture.event_kind, self.decoy.name(), peer, local_port)
            .with_node_id(self.node_id.clone())
            .with_fields(capture.fields);
        self.sink.emit(event);
    }
}

/// Drop the connection with a reset instead of an orderly close
fn abort(stream: TcpStream) {
    if let Err(e) = stream.set_linger(Some(Duration::ZERO)) {
        debug!(error = %e, "Failed to set zero linger");
    }
    drop(stream);
}

/// Connect to a packet-framed decoy as a client
#[instrument(skip(addr))]
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Framed<TcpStream, PacketCodec>> {
    let stream = TcpStream::connect(addr).await?;
    Ok(Framed::new(stream, PacketCodec))
}
