//! Proxy error types
//!
//! A single typed error covers the whole pipeline, from broker discovery
//! through the port-forward transport down to individual Kafka frames.
//! The variants are grouped by how far the damage reaches:
//!
//! - Discovery and transport errors are fatal for the process or for a
//!   whole tunnel.
//! - Frame-level errors (size, framing, correlation, codec) tear down a
//!   single proxied connection; the tunnel keeps serving new ones.

use thiserror::Error;

use crate::kafka::constants::MAX_FRAME_SIZE;

/// Errors that can occur while exposing a Kafka cluster
#[derive(Error, Debug)]
pub enum ProxyError {
    // ===== Startup Errors =====
    /// Broker discovery failed before any tunnel was created
    #[error("discovery failed: {message}")]
    Discovery { message: String },

    /// Invalid configuration value
    #[error("invalid configuration '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    // ===== Tunnel Errors =====
    /// Failure to establish or maintain the upgraded stream to the API server
    #[error("kubernetes transport error: {0}")]
    Transport(#[from] kube::Error),

    /// The port-forward connection did not yield a stream for the requested port
    #[error("no upgraded stream available for remote port {port}")]
    StreamUnavailable { port: u16 },

    /// A port forwarder terminated in a way that has no richer error
    #[error("port forwarder for node {node} failed: {message}")]
    Forwarder { node: i32, message: String },

    // ===== Frame Errors =====
    /// IO error on the client socket or the broker stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame size prefix is out of range
    #[error("invalid frame size: {size} bytes (must be 1-{MAX_FRAME_SIZE})")]
    InvalidFrameSize { size: i32 },

    /// Frame payload is inconsistent with its declared length
    #[error("malformed frame: {message}")]
    Malformed { message: String },

    /// A response arrived whose correlation id matches no in-flight request,
    /// or a request reused an id that is still outstanding
    #[error("correlation id {correlation_id} violates the request/response protocol")]
    CorrelationViolation { correlation_id: i32 },

    /// Error from the kafka-protocol codec while decoding or re-encoding a body
    #[error("protocol codec error: {0}")]
    Codec(#[source] anyhow::Error),
}

impl ProxyError {
    /// Create a discovery error with context
    pub fn discovery(message: impl Into<String>) -> Self {
        ProxyError::Discovery {
            message: message.into(),
        }
    }

    /// Create a malformed frame error with context
    pub fn malformed(message: impl Into<String>) -> Self {
        ProxyError::Malformed {
            message: message.into(),
        }
    }

    /// Wrap a codec failure from the kafka-protocol crate
    pub fn codec(err: impl Into<anyhow::Error>) -> Self {
        ProxyError::Codec(err.into())
    }

    /// Returns true if this error ends the whole fleet rather than a
    /// single proxied connection.
    pub fn is_fatal_for_tunnel(&self) -> bool {
        matches!(
            self,
            ProxyError::Transport(_)
                | ProxyError::StreamUnavailable { .. }
                | ProxyError::Forwarder { .. }
        )
    }
}

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
