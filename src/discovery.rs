//! Broker discovery and local port assignment
//!
//! Discovery produces a [`ClusterInfo`]: the port of the plaintext listener
//! inside the cluster and the mapping from broker node id to pod name. The
//! supervisor turns that into a [`PortMap`], the bijection from node id to
//! the loopback port its tunnel will listen on.
//!
//! [`PodDiscovery`] is the concrete baker: it lists broker pods through the
//! Kubernetes API by label selector. Any failure here is fatal before a
//! single tunnel is created.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::info;

use crate::error::{ProxyError, Result};
use crate::kafka::constants::LOCAL_HOST;

/// Pod label carrying an explicit broker node id.
///
/// Pods without it fall back to the trailing ordinal of their name, which is
/// how StatefulSet-managed brokers are numbered.
pub const NODE_ID_LABEL: &str = "kexpose.io/node-id";

/// The discovered cluster: the in-cluster listener port and one pod per
/// broker node id. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    /// Port of the Kafka listener inside the cluster
    pub listener_port: u16,
    /// Broker node id to pod name
    pub nodes: BTreeMap<i32, String>,
}

/// The bijection from broker node id to local loopback port.
///
/// Built once by sorting node ids ascending and assigning consecutive ports
/// from a starting port; shared read-only by every tunnel's proxy.
#[derive(Debug, Clone)]
pub struct PortMap {
    ports: BTreeMap<i32, u16>,
}

impl PortMap {
    /// Assign consecutive local ports to node ids in ascending order.
    pub fn build(nodes: &BTreeMap<i32, String>, starting_port: u16) -> Result<Self> {
        if nodes.is_empty() {
            return Err(ProxyError::discovery("no broker nodes to expose"));
        }

        let span = nodes.len() - 1;
        if usize::from(starting_port) + span > usize::from(u16::MAX) {
            return Err(ProxyError::InvalidConfig {
                key: "starting-port".to_string(),
                message: format!(
                    "starting port {} leaves no room for {} brokers",
                    starting_port,
                    nodes.len()
                ),
            });
        }

        let ports = nodes
            .keys()
            .enumerate()
            .map(|(i, &node)| (node, starting_port + i as u16))
            .collect();
        Ok(Self { ports })
    }

    /// Local port assigned to a node id, if the node was discovered.
    pub fn get(&self, node: i32) -> Option<u16> {
        self.ports.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Node id and port pairs in ascending node id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, u16)> + '_ {
        self.ports.iter().map(|(&node, &port)| (node, port))
    }

    /// The comma-joined bootstrap address a Kafka client connects to, in
    /// ascending node id order so the output is stable across runs.
    pub fn bootstrap_address(&self) -> String {
        self.ports
            .values()
            .map(|port| format!("{LOCAL_HOST}:{port}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Discovers broker pods through the Kubernetes API.
pub struct PodDiscovery {
    pods: Api<Pod>,
    selector: String,
    listener_port: u16,
}

impl PodDiscovery {
    pub fn new(
        client: Client,
        namespace: &str,
        selector: impl Into<String>,
        listener_port: u16,
    ) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            selector: selector.into(),
            listener_port,
        }
    }

    /// List the broker pods matching the selector and derive their node ids.
    ///
    /// Every matched pod must be Ready; a cluster that is still rolling out
    /// would otherwise get tunnels to pods that cannot accept traffic yet.
    pub async fn discover(&self) -> Result<ClusterInfo> {
        let listed = self
            .pods
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(|e| ProxyError::discovery(format!("failed to list broker pods: {e}")))?;

        let mut nodes = BTreeMap::new();
        for pod in &listed {
            let name = match pod.metadata.name.clone() {
                Some(name) => name,
                None => continue,
            };

            if !is_ready(pod) {
                return Err(ProxyError::discovery(format!(
                    "broker pod {name} was found, but it is not ready"
                )));
            }

            let node = node_id_for(pod, &name)?;
            if let Some(previous) = nodes.insert(node, name.clone()) {
                return Err(ProxyError::discovery(format!(
                    "pods {previous} and {name} both claim node id {node}"
                )));
            }
        }

        if nodes.is_empty() {
            return Err(ProxyError::discovery(format!(
                "no broker pods matched selector '{}'",
                self.selector
            )));
        }

        info!(
            nodes = nodes.len(),
            listener_port = self.listener_port,
            "discovered Kafka brokers"
        );

        Ok(ClusterInfo {
            listener_port: self.listener_port,
            nodes,
        })
    }
}

fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Node id from the explicit label, or from the trailing ordinal of the pod
/// name (`my-cluster-kafka-2` -> 2).
fn node_id_for(pod: &Pod, name: &str) -> Result<i32> {
    if let Some(raw) = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(NODE_ID_LABEL))
    {
        return raw.parse().map_err(|_| {
            ProxyError::discovery(format!(
                "pod {name} carries an invalid {NODE_ID_LABEL} label: {raw}"
            ))
        });
    }

    name.rsplit('-')
        .next()
        .and_then(|ordinal| ordinal.parse().ok())
        .ok_or_else(|| {
            ProxyError::discovery(format!(
                "cannot derive a node id from pod name {name}; set the {NODE_ID_LABEL} label"
            ))
        })
}
