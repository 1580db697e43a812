// Property-based tests using proptest
//
// Randomized checks for the invariants that hold for every input: the port
// map construction and the pieces of wire framing that are simple enough to
// fuzz without a connection.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use kexpose::discovery::PortMap;

proptest! {
    #[test]
    fn port_map_assigns_every_node_exactly_one_port(
        ids in proptest::collection::btree_set(any::<i32>(), 1..64usize),
        starting_port in 1024u16..32000u16,
    ) {
        let nodes: BTreeMap<i32, String> = ids
            .iter()
            .map(|&id| (id, format!("kafka-{id}")))
            .collect();

        let map = PortMap::build(&nodes, starting_port).unwrap();
        prop_assert_eq!(map.len(), nodes.len());

        // Ports are exactly the consecutive range from the starting port,
        // assigned in ascending node id order
        for (i, (&node, _)) in nodes.iter().enumerate() {
            prop_assert_eq!(map.get(node), Some(starting_port + i as u16));
        }
    }

    #[test]
    fn port_map_is_a_bijection(
        ids in proptest::collection::btree_set(any::<i32>(), 1..64usize),
        starting_port in 1024u16..32000u16,
    ) {
        let nodes: BTreeMap<i32, String> = ids
            .iter()
            .map(|&id| (id, format!("kafka-{id}")))
            .collect();

        let map = PortMap::build(&nodes, starting_port).unwrap();
        let assigned: BTreeSet<u16> = map.iter().map(|(_, port)| port).collect();
        prop_assert_eq!(assigned.len(), map.len(), "no two nodes share a port");
    }

    #[test]
    fn bootstrap_address_lists_ports_in_ascending_node_order(
        ids in proptest::collection::btree_set(-1000i32..1000i32, 1..16usize),
        starting_port in 1024u16..32000u16,
    ) {
        let nodes: BTreeMap<i32, String> = ids
            .iter()
            .map(|&id| (id, format!("kafka-{id}")))
            .collect();

        let map = PortMap::build(&nodes, starting_port).unwrap();
        let address = map.bootstrap_address();
        let parts: Vec<&str> = address.split(',').collect();
        prop_assert_eq!(parts.len(), nodes.len());

        for (i, part) in parts.iter().enumerate() {
            let expected = format!("localhost:{}", starting_port + i as u16);
            prop_assert_eq!(*part, expected.as_str());
        }
    }

    #[test]
    fn correlation_id_survives_response_header_encoding(correlation_id: i32) {
        use bytes::BytesMut;
        use kafka_protocol::messages::ResponseHeader;
        use kafka_protocol::protocol::Encodable;

        let header = ResponseHeader::default().with_correlation_id(correlation_id);
        let mut buf = BytesMut::new();
        header.encode(&mut buf, 1).unwrap();

        // The correlation id is always the first four payload bytes
        let decoded = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        prop_assert_eq!(decoded, correlation_id);
    }

    #[test]
    fn frame_size_prefix_round_trips(size in 1i32..100_000_000i32) {
        let bytes = size.to_be_bytes();
        prop_assert_eq!(i32::from_be_bytes(bytes), size);
    }
}
