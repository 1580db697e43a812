//! Advertised endpoint rewriting
//!
//! Each supported api key is one arm of a tag switch with its own decode,
//! mutate, and re-encode step; everything else falls through to a byte copy
//! in the pumps. The kafka-protocol crate supplies the generated message
//! structs, so all registered api versions decode and unknown tagged fields
//! survive the round trip.
//!
//! The mutation itself is always the same: any host/port pair advertising a
//! broker is replaced with `localhost` and the local port its tunnel
//! listens on. A broker the port map does not know keeps its original
//! endpoint; the client failing to reach it is the honest diagnostic.

use bytes::BytesMut;
use kafka_protocol::messages::{
    ApiVersionsRequest, ApiVersionsResponse, DescribeClusterResponse, FetchResponse,
    FindCoordinatorRequest, FindCoordinatorResponse, MetadataRequest, MetadataResponse,
    ProduceResponse, ShareAcknowledgeResponse, ShareFetchResponse,
};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use tracing::warn;

use crate::discovery::PortMap;
use crate::error::{ProxyError, Result};
use crate::kafka::constants::{
    API_KEY_API_VERSIONS, API_KEY_DESCRIBE_CLUSTER, API_KEY_FETCH, API_KEY_FIND_COORDINATOR,
    API_KEY_METADATA, API_KEY_PRODUCE, API_KEY_SHARE_ACKNOWLEDGE, API_KEY_SHARE_FETCH, LOCAL_HOST,
};
use crate::kafka::frame::Frame;

/// FindCoordinator switched from a single inline coordinator to a batched
/// list in this version.
const FIND_COORDINATOR_BATCHED_VERSION: i16 = 4;

/// DescribeCluster responses carry broker endpoints under this endpoint
/// type; controller endpoints pass through untouched.
const BROKER_ENDPOINT_TYPE: i8 = 1;

/// Rewrite the advertised endpoints in a response frame.
///
/// Frames whose api key is not in the table are left untouched and will be
/// forwarded byte-for-byte.
pub fn rewrite_response(frame: &mut Frame, node: i32, ports: &PortMap) -> Result<()> {
    match frame.api_key {
        API_KEY_PRODUCE => mutate::<ProduceResponse>(frame, |response| {
            for endpoint in &mut response.node_endpoints {
                rewrite_endpoint(
                    node,
                    endpoint.node_id.0,
                    &mut endpoint.host,
                    &mut endpoint.port,
                    ports,
                );
            }
        }),
        API_KEY_FETCH => mutate::<FetchResponse>(frame, |response| {
            for endpoint in &mut response.node_endpoints {
                rewrite_endpoint(
                    node,
                    endpoint.node_id.0,
                    &mut endpoint.host,
                    &mut endpoint.port,
                    ports,
                );
            }
        }),
        API_KEY_METADATA => mutate::<MetadataResponse>(frame, |response| {
            for broker in &mut response.brokers {
                rewrite_endpoint(node, broker.node_id.0, &mut broker.host, &mut broker.port, ports);
            }
        }),
        API_KEY_FIND_COORDINATOR => {
            let batched = frame.api_version >= FIND_COORDINATOR_BATCHED_VERSION;
            mutate::<FindCoordinatorResponse>(frame, |response| {
                if batched {
                    for coordinator in &mut response.coordinators {
                        rewrite_endpoint(
                            node,
                            coordinator.node_id.0,
                            &mut coordinator.host,
                            &mut coordinator.port,
                            ports,
                        );
                    }
                } else {
                    let coordinator_node = response.node_id.0;
                    rewrite_endpoint(
                        node,
                        coordinator_node,
                        &mut response.host,
                        &mut response.port,
                        ports,
                    );
                }
            })
        }
        // No endpoint fields; round-tripped to exercise the codec
        API_KEY_API_VERSIONS => mutate::<ApiVersionsResponse>(frame, |_| {}),
        API_KEY_DESCRIBE_CLUSTER => mutate::<DescribeClusterResponse>(frame, |response| {
            if response.endpoint_type == BROKER_ENDPOINT_TYPE {
                for broker in &mut response.brokers {
                    rewrite_endpoint(
                        node,
                        broker.broker_id.0,
                        &mut broker.host,
                        &mut broker.port,
                        ports,
                    );
                }
            }
        }),
        API_KEY_SHARE_FETCH => mutate::<ShareFetchResponse>(frame, |response| {
            for endpoint in &mut response.node_endpoints {
                rewrite_endpoint(
                    node,
                    endpoint.node_id.0,
                    &mut endpoint.host,
                    &mut endpoint.port,
                    ports,
                );
            }
        }),
        API_KEY_SHARE_ACKNOWLEDGE => mutate::<ShareAcknowledgeResponse>(frame, |response| {
            for endpoint in &mut response.node_endpoints {
                rewrite_endpoint(
                    node,
                    endpoint.node_id.0,
                    &mut endpoint.host,
                    &mut endpoint.port,
                    ports,
                );
            }
        }),
        _ => Ok(()),
    }
}

/// Decode and immediately re-encode the request bodies the proxy has codecs
/// for. Nothing is mutated; a request that fails this round trip would also
/// fail as a response context, so it surfaces codec gaps early.
pub fn roundtrip_request(frame: &mut Frame) -> Result<()> {
    match frame.api_key {
        API_KEY_METADATA => mutate::<MetadataRequest>(frame, |_| {}),
        API_KEY_FIND_COORDINATOR => mutate::<FindCoordinatorRequest>(frame, |_| {}),
        API_KEY_API_VERSIONS => mutate::<ApiVersionsRequest>(frame, |_| {}),
        _ => Ok(()),
    }
}

/// Decode the frame body, apply the mutation, and install the re-encoded
/// body. On any codec error the frame is left with its original body.
fn mutate<T>(frame: &mut Frame, apply: impl FnOnce(&mut T)) -> Result<()>
where
    T: Decodable + Encodable,
{
    let mut body = frame.body();
    let mut message = T::decode(&mut body, frame.api_version).map_err(ProxyError::codec)?;
    apply(&mut message);

    let mut encoded = BytesMut::new();
    message
        .encode(&mut encoded, frame.api_version)
        .map_err(ProxyError::codec)?;
    frame.replace_body(encoded.freeze());
    Ok(())
}

fn rewrite_endpoint(node: i32, advertised: i32, host: &mut StrBytes, port: &mut i32, ports: &PortMap) {
    match ports.get(advertised) {
        Some(local_port) => {
            *host = StrBytes::from_static_str(LOCAL_HOST);
            *port = i32::from(local_port);
        }
        None => warn!(
            node,
            advertised_node = advertised,
            "advertised broker has no local port mapping, leaving its endpoint unchanged"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn port_map(ids: &[i32], starting_port: u16) -> PortMap {
        let nodes: BTreeMap<i32, String> =
            ids.iter().map(|&id| (id, format!("kafka-{id}"))).collect();
        PortMap::build(&nodes, starting_port).unwrap()
    }

    #[test]
    fn test_rewrite_endpoint_known_node() {
        let ports = port_map(&[0, 1], 50000);
        let mut host = StrBytes::from_static_str("broker-1.svc");
        let mut port = 9092;

        rewrite_endpoint(1, 1, &mut host, &mut port, &ports);
        assert_eq!(&*host, "localhost");
        assert_eq!(port, 50001);
    }

    #[test]
    fn test_rewrite_endpoint_unknown_node_unchanged() {
        let ports = port_map(&[0, 1], 50000);
        let mut host = StrBytes::from_static_str("broker-99.svc");
        let mut port = 9092;

        rewrite_endpoint(0, 99, &mut host, &mut port, &ports);
        assert_eq!(&*host, "broker-99.svc");
        assert_eq!(port, 9092);
    }
}
