//! kexpose command line entry point
//!
//! Parses arguments, initializes logging, discovers the brokers, and hands
//! the result to the fleet supervisor. Exits 0 on a signal-initiated
//! shutdown and 1 on any fatal error.

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::{info, Level};

use kexpose::config::Config;
use kexpose::discovery::PodDiscovery;
use kexpose::forward::Fleet;
use kexpose::kafka::constants::{DEFAULT_LISTENER_PORT, DEFAULT_STARTING_PORT};

/// Expose an in-cluster Kafka on localhost
#[derive(Parser, Debug)]
#[command(name = "kexpose")]
#[command(about = "Expose a Kafka cluster running inside Kubernetes on workstation loopback ports")]
#[command(version)]
struct Args {
    /// Namespace of the Kafka cluster (defaults to the kube context namespace)
    #[arg(long, short = 'n', env = "KEXPOSE_NAMESPACE")]
    namespace: Option<String>,

    /// Label selector matching the broker pods
    #[arg(
        long,
        short = 'l',
        env = "KEXPOSE_SELECTOR",
        default_value = "app.kubernetes.io/name=kafka"
    )]
    selector: String,

    /// Port of the plaintext Kafka listener inside the cluster
    #[arg(long, env = "KEXPOSE_LISTENER_PORT", default_value_t = DEFAULT_LISTENER_PORT)]
    listener_port: u16,

    /// First local port; node ids are mapped to consecutive ports from here
    #[arg(long, env = "KEXPOSE_STARTING_PORT", default_value_t = DEFAULT_STARTING_PORT)]
    starting_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KEXPOSE_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    let config = Config {
        namespace: args.namespace,
        selector: args.selector,
        listener_port: args.listener_port,
        starting_port: args.starting_port,
    };
    config.validate()?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    info!(
        namespace = %namespace,
        selector = %config.selector,
        "looking for Kafka brokers"
    );

    let discovery = PodDiscovery::new(
        client.clone(),
        &namespace,
        config.selector.clone(),
        config.listener_port,
    );
    let cluster = discovery
        .discover()
        .await
        .context("failed to discover the Kafka cluster")?;

    let fleet = Fleet::new(client, &namespace, &cluster, config.starting_port)?;
    fleet.run().await?;

    Ok(())
}
