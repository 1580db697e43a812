//! Fleet supervisor
//!
//! Builds the port map, constructs one tunnel per broker in ascending node
//! id order, starts them all, and only announces the bootstrap address once
//! every tunnel has signalled readiness. After that it waits for either a
//! shutdown signal (clean exit) or the first tunnel error (fatal exit); in
//! both cases the stop channel fans out to the whole fleet.

use std::sync::Arc;

use kube::Client;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use crate::discovery::{ClusterInfo, PortMap};
use crate::error::{ProxyError, Result};
use crate::forward::PortForward;
use crate::kafka::proxy::BrokerProxy;

/// The fleet of port forwarders for one exposed cluster.
pub struct Fleet {
    port_map: Arc<PortMap>,
    forwarders: Vec<PortForward>,
}

impl Fleet {
    /// Assign local ports and construct a tunnel per discovered broker.
    pub fn new(
        client: Client,
        namespace: &str,
        cluster: &ClusterInfo,
        starting_port: u16,
    ) -> Result<Self> {
        let port_map = Arc::new(PortMap::build(&cluster.nodes, starting_port)?);

        let mut forwarders = Vec::with_capacity(cluster.nodes.len());
        for (&node, pod_name) in &cluster.nodes {
            let local_port = port_map.get(node).ok_or_else(|| {
                ProxyError::discovery(format!("no local port assigned to node {node}"))
            })?;
            let proxy = Arc::new(BrokerProxy::new(node, Arc::clone(&port_map)));
            forwarders.push(PortForward::new(
                client.clone(),
                namespace,
                pod_name.clone(),
                node,
                local_port,
                cluster.listener_port,
                proxy,
            ));
        }

        Ok(Self {
            port_map,
            forwarders,
        })
    }

    /// The comma-joined `localhost:<port>` list in ascending node id order.
    pub fn bootstrap_address(&self) -> String {
        self.port_map.bootstrap_address()
    }

    /// Run the fleet until a shutdown signal or the first fatal error.
    pub async fn run(self) -> Result<()> {
        let Fleet {
            port_map,
            forwarders,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (error_tx, mut error_rx) = mpsc::channel(forwarders.len().max(1));

        info!(forwarders = forwarders.len(), "starting port forwarders");

        let mut readies = Vec::with_capacity(forwarders.len());
        for forwarder in forwarders {
            let node = forwarder.node();
            let (ready_tx, ready_rx) = oneshot::channel();
            readies.push((node, ready_rx));
            forwarder.start(ready_tx, stop_rx.clone(), error_tx.clone());
        }
        drop(error_tx);

        // Bootstrap must not be announced before every listener accepts
        for (node, ready) in readies {
            if ready.await.is_err() {
                let err = match error_rx.recv().await {
                    Some((failed, e)) => {
                        error!(node = failed, error = %e, "port forwarder failed during startup");
                        e
                    }
                    None => ProxyError::Forwarder {
                        node,
                        message: "terminated before becoming ready".to_string(),
                    },
                };
                let _ = stop_tx.send(true);
                return Err(err);
            }
        }

        info!(
            bootstrap = %port_map.bootstrap_address(),
            "Kafka cluster is exposed, use this bootstrap address to connect"
        );

        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutting down");
                let _ = stop_tx.send(true);
                Ok(())
            }
            received = error_rx.recv() => {
                let _ = stop_tx.send(true);
                match received {
                    Some((node, err)) => {
                        error!(node, error = %err, "port forwarder failed");
                        Err(err)
                    }
                    // Every forwarder exited without reporting an error
                    None => Ok(()),
                }
            }
        }
    }
}

/// Resolves when the user asks for shutdown via interrupt or termination.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
