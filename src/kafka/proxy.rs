//! Per-broker duplex proxy
//!
//! One proxy sits between a local client socket and the upgraded stream to
//! its broker pod. Two pumps run concurrently: client to broker forwards
//! requests and records their headers by correlation id, broker to client
//! recovers response framing from that record and applies the endpoint
//! rewrite before forwarding.
//!
//! When either pump stops, it shuts down the write half it owns. The peer
//! pump then runs into EOF and stops as well, so a failure on one side
//! always tears down the whole connection and nothing else.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::discovery::PortMap;
use crate::error::ProxyError;
use crate::kafka::frame::{self, CorrelationMap};
use crate::kafka::rewrite;

/// The frame-rewriting interceptor for one broker.
///
/// The proxy is constructed once per tunnel and shared by all of the
/// tunnel's connections; the correlation tracker is per connection and
/// created inside [`BrokerProxy::run`].
pub struct BrokerProxy {
    node: i32,
    ports: Arc<PortMap>,
}

impl BrokerProxy {
    pub fn new(node: i32, ports: Arc<PortMap>) -> Self {
        Self { node, ports }
    }

    pub fn node(&self) -> i32 {
        self.node
    }

    /// Drive both pumps until the connection is torn down from either side.
    pub async fn run<C, B>(&self, client: C, broker: B)
    where
        C: AsyncRead + AsyncWrite + Unpin,
        B: AsyncRead + AsyncWrite + Unpin,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (broker_read, broker_write) = tokio::io::split(broker);
        let correlations = Mutex::new(CorrelationMap::new());

        tokio::join!(
            self.client_to_broker(client_read, broker_write, &correlations),
            self.broker_to_client(broker_read, client_write, &correlations),
        );
    }

    /// Forward request frames from the client to the broker.
    async fn client_to_broker<R, W>(
        &self,
        mut client: R,
        mut broker: W,
        correlations: &Mutex<CorrelationMap>,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let node = self.node;
        loop {
            let mut request = match frame::read_request(&mut client).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!(node, "-> reached EOF");
                    break;
                }
                Err(e) => {
                    error!(node, error = %e, "-> failed to read request");
                    break;
                }
            };

            debug!(
                node,
                size = request.wire_size(),
                api_key = request.api_key,
                api_version = request.api_version,
                correlation_id = request.correlation_id,
                client_id = ?request.client_id(),
                "-> received request"
            );

            if correlations.lock().insert(request.header.clone()).is_some() {
                let violation = ProxyError::CorrelationViolation {
                    correlation_id: request.correlation_id,
                };
                error!(node, error = %violation, "-> correlation id reused while outstanding");
                break;
            }

            if let Err(e) = rewrite::roundtrip_request(&mut request) {
                error!(node, api_key = request.api_key, error = %e, "-> failed to re-encode request");
                break;
            }

            debug!(node, "-> proxying request from local to remote");
            if let Err(e) = frame::write_frame(&mut broker, &request).await {
                error!(node, error = %e, "-> failed to forward request");
                break;
            }
        }

        // Tear down the broker side so the response pump sees EOF
        let _ = broker.shutdown().await;
    }

    /// Forward response frames from the broker to the client, rewriting
    /// advertised endpoints on the way through.
    async fn broker_to_client<R, W>(
        &self,
        mut broker: R,
        mut client: W,
        correlations: &Mutex<CorrelationMap>,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let node = self.node;
        loop {
            let mut response = match frame::read_response(&mut broker, correlations).await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    debug!(node, "<- reached EOF");
                    break;
                }
                Err(e) => {
                    error!(node, error = %e, "<- failed to read response");
                    break;
                }
            };

            debug!(
                node,
                size = response.wire_size(),
                api_key = response.api_key,
                api_version = response.api_version,
                correlation_id = response.correlation_id,
                "<- received response"
            );

            correlations.lock().remove(response.correlation_id);

            if let Err(e) = rewrite::rewrite_response(&mut response, node, &self.ports) {
                // The original frame must not be forwarded either: the
                // client asked for an api version we failed to re-encode
                error!(node, api_key = response.api_key, error = %e, "<- failed to rewrite response");
                break;
            }

            debug!(node, "<- proxying response from remote");
            if let Err(e) = frame::write_frame(&mut client, &response).await {
                error!(node, error = %e, "<- failed to forward response");
                break;
            }
        }

        // Tear down the client side so the request pump sees EOF
        let _ = client.shutdown().await;
    }
}
