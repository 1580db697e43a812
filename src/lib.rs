//! kexpose exposes a Kafka cluster running inside a local Kubernetes
//! environment (Minikube, Kind, Docker Desktop) to clients on the
//! workstation, without an externally-routable listener.
//!
//! It discovers the broker pods, opens one port-forward tunnel per broker
//! through the Kubernetes API server, and rewrites Kafka protocol frames in
//! flight so that the broker addresses advertised to the client point at
//! local loopback ports instead of in-cluster DNS names.

pub mod config;
pub mod discovery;
pub mod error;
pub mod forward;
pub mod kafka;

pub use error::{ProxyError, Result};
