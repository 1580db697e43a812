// Runtime configuration
//
// Settings come from the command line (with environment fallbacks) and are
// validated once before anything talks to the cluster.

use crate::error::{ProxyError, Result};
use crate::kafka::constants::{DEFAULT_LISTENER_PORT, DEFAULT_STARTING_PORT, MIN_LOCAL_PORT};

/// Settings for one run of the proxy
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace of the Kafka cluster; `None` defers to the kube context
    pub namespace: Option<String>,
    /// Label selector matching the broker pods
    pub selector: String,
    /// Port of the plaintext listener inside the cluster
    pub listener_port: u16,
    /// First local port; brokers get consecutive ports from here in
    /// ascending node id order
    pub starting_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: None,
            selector: "app.kubernetes.io/name=kafka".to_string(),
            listener_port: DEFAULT_LISTENER_PORT,
            starting_port: DEFAULT_STARTING_PORT,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.starting_port < MIN_LOCAL_PORT {
            return Err(ProxyError::InvalidConfig {
                key: "starting-port".to_string(),
                message: format!(
                    "{} is below the unprivileged port range (min {MIN_LOCAL_PORT})",
                    self.starting_port
                ),
            });
        }

        if self.selector.trim().is_empty() {
            return Err(ProxyError::InvalidConfig {
                key: "selector".to_string(),
                message: "label selector must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
