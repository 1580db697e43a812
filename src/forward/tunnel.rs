//! Per-broker port-forward tunnel
//!
//! A tunnel binds a loopback listener for one broker and serves it through
//! the Kubernetes API server's port-forward subresource. Each accepted
//! local connection gets its own upgraded stream to the pod and its own
//! pair of proxy pumps; a connection dying affects nothing else, while a
//! failure to reach the API server ends the tunnel and, through the
//! supervisor, the whole fleet.

use std::net::Ipv4Addr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::kafka::proxy::BrokerProxy;

/// The tunnel for one broker pod.
pub struct PortForward {
    node: i32,
    client: Client,
    namespace: String,
    pod_name: String,
    local_port: u16,
    remote_port: u16,
    proxy: Arc<BrokerProxy>,
}

impl PortForward {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        node: i32,
        local_port: u16,
        remote_port: u16,
        proxy: Arc<BrokerProxy>,
    ) -> Self {
        Self {
            node,
            client,
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            local_port,
            remote_port,
            proxy,
        }
    }

    pub fn node(&self) -> i32 {
        self.node
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Spawn the serving loop. A terminal error is reported on the error
    /// channel together with the node id it belongs to.
    pub fn start(
        self,
        ready: oneshot::Sender<()>,
        stop: watch::Receiver<bool>,
        errors: mpsc::Sender<(i32, ProxyError)>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let node = self.node;
            if let Err(e) = self.forward_ports(ready, stop).await {
                let _ = errors.send((node, e)).await;
            }
        })
    }

    /// Serve until the stop channel fires or a transport error ends the
    /// tunnel. Blocking variant of [`PortForward::start`].
    ///
    /// Readiness is signalled only after the local listener is bound and
    /// one upgrade handshake against the API server has succeeded, so the
    /// supervisor never announces a bootstrap address that is not yet
    /// accepting connections.
    pub async fn forward_ports(
        &self,
        ready: oneshot::Sender<()>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.local_port)).await?;

        // Probe the upgrade path before announcing readiness
        let probe = pods
            .portforward(&self.pod_name, &[self.remote_port])
            .await?;
        drop(probe);

        info!(
            node = self.node,
            local_port = self.local_port,
            pod_name = %self.pod_name,
            remote_port = self.remote_port,
            namespace = %self.namespace,
            "port forwarder ready"
        );
        let _ = ready.send(());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            debug!(node = self.node, peer = %peer, "accepted local connection");
                            self.dispatch(&pods, socket).await?;
                        }
                        Err(e) => {
                            warn!(node = self.node, error = %e, "failed to accept connection");
                        }
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        debug!(node = self.node, "port forwarder stopping");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Open a fresh upgraded stream to the pod and hand the connection to a
    /// proxy task.
    async fn dispatch(&self, pods: &Api<Pod>, socket: TcpStream) -> Result<()> {
        let mut forwarder = pods
            .portforward(&self.pod_name, &[self.remote_port])
            .await?;
        let upstream = forwarder
            .take_stream(self.remote_port)
            .ok_or(ProxyError::StreamUnavailable {
                port: self.remote_port,
            })?;

        let proxy = Arc::clone(&self.proxy);
        tokio::spawn(async move {
            // The forwarder owns the upgraded connection; it must outlive
            // the pumps running over its stream
            let _connection = forwarder;
            proxy.run(socket, upstream).await;
        });
        Ok(())
    }
}
