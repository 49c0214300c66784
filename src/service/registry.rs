use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use super::{Decoy, MySqlDecoy};
use crate::config::{Config, ConfigHandle, MODULES};
use crate::error::Result;
use crate::event::EventSink;
use crate::transport::tcp::Supervisor;
use crate::utils::metrics::global_metrics;

/// Build the decoy for `module`, if this build can emulate it
fn build_decoy(module: &str, config: &Config) -> Option<Result<Arc<dyn Decoy>>> {
    match module {
        "mysql" => Some(MySqlDecoy::from_config(config).map(|d| Arc::new(d) as Arc<dyn Decoy>)),
        _ => None,
    }
}

/// Running set of decoys, one listener each
pub struct ServiceRegistry {
    decoys: Vec<Arc<dyn Decoy>>,
    sink: Arc<dyn EventSink>,
    node_id: Option<String>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: JoinSet<Result<()>>,
}

impl ServiceRegistry {
    /// Build a decoy for every enabled module
    ///
    /// A module whose own parameters fail their checks is left out and
    /// logged; the others still start.
    #[instrument(skip_all)]
    pub fn from_config(config: &ConfigHandle, sink: Arc<dyn EventSink>) -> Result<Self> {
        let snapshot = config.snapshot()?;

        let mut decoys = Vec::new();
        for module in MODULES.iter().filter(|m| snapshot.module_enabled(m.name)) {
            match build_decoy(module.name, &snapshot) {
                Some(Ok(decoy)) => decoys.push(decoy),
                Some(Err(e)) => error!(module = module.name, error = %e, "Refusing to start decoy"),
                None => warn!(module = module.name, "Module enabled but not emulated, skipping"),
            }
        }

        Ok(Self::with_decoys(decoys, sink, snapshot.node_id()))
    }

    pub fn with_decoys(
        decoys: Vec<Arc<dyn Decoy>>,
        sink: Arc<dyn EventSink>,
        node_id: Option<String>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            decoys,
            sink,
            node_id,
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    pub fn decoys(&self) -> &[Arc<dyn Decoy>] {
        &self.decoys
    }

    /// Bind and serve every decoy; returns the bound addresses
    ///
    /// A decoy whose port cannot be bound is skipped.
    pub async fn start(&mut self) -> Vec<(&'static str, SocketAddr)> {
        let mut bound = Vec::new();

        for decoy in &self.decoys {
            let listener = match TcpListener::bind(decoy.bind_addr()).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(service = decoy.name(), address = %decoy.bind_addr(), error = %e, "Failed to bind decoy");
                    continue;
                }
            };
            let local_addr = match listener.local_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    error!(service = decoy.name(), error = %e, "Failed to read bound address");
                    continue;
                }
            };

            let supervisor = Supervisor::new(decoy.clone(), self.sink.clone(), self.node_id.clone());
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks
                .spawn(async move { supervisor.serve(listener, shutdown_rx).await });
            bound.push((decoy.name(), local_addr));
        }

        info!(count = bound.len(), "Decoys started");
        bound
    }

    /// Stop accepting, wait for listeners to drain, log final metrics
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Decoy listener failed"),
                Err(e) => error!(error = %e, "Decoy listener task panicked"),
            }
        }

        global_metrics().log_metrics();
    }
}
