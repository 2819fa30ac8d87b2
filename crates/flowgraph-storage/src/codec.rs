//! JSON persistence codec for graph definitions.
//!
//! The payload is a small envelope around the serialized [`Graph`]: a format
//! number and the tree itself. Element identity is carried by element ids, so
//! every cross-reference inside one payload (parent links, connections,
//! member targets) resolves to the same element after a round trip. The
//! graph's id lookup cache is not serialized and is rebuilt lazily on first
//! use.

use serde::{Deserialize, Serialize};

use flowgraph_core::Graph;

use crate::error::StorageError;

/// Current payload format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: u32,
    graph: &'a Graph,
}

#[derive(Deserialize)]
struct Envelope {
    format: u32,
    graph: Graph,
}

/// Serializes `graph` into a storable payload.
pub fn encode(graph: &Graph) -> Result<Vec<u8>, StorageError> {
    let envelope = EnvelopeRef {
        format: FORMAT_VERSION,
        graph,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Pretty-printed variant of [`encode`] for files meant to be read by people.
pub fn encode_pretty(graph: &Graph) -> Result<Vec<u8>, StorageError> {
    let envelope = EnvelopeRef {
        format: FORMAT_VERSION,
        graph,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Deserializes a payload produced by [`encode`].
///
/// Connections whose endpoints are missing from the payload are pruned and
/// id counters are raised past every stored id.
pub fn decode(bytes: &[u8]) -> Result<Graph, StorageError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.format != FORMAT_VERSION {
        return Err(StorageError::UnsupportedFormat {
            found: envelope.format,
            expected: FORMAT_VERSION,
        });
    }
    let mut graph = envelope.graph;
    let pruned = graph.prune_all_dangling();
    if pruned > 0 {
        tracing::warn!(graph = %graph.name, pruned, "pruned dangling connections while decoding");
    }
    if graph.repair_counters() {
        tracing::warn!(graph = %graph.name, "id counters were behind stored elements");
    }
    Ok(graph)
}

/// Deserializes a payload that replaces `previous`.
///
/// The result keeps `previous`'s container identity and carries version
/// `previous.version() + 1`, which is what running instances watch for.
pub fn decode_superseding(bytes: &[u8], previous: &Graph) -> Result<Graph, StorageError> {
    let mut graph = decode(bytes)?;
    if graph.uid() != previous.uid() {
        return Err(StorageError::ForeignPayload {
            expected: previous.uid(),
            found: graph.uid(),
        });
    }
    graph.supersede(previous);
    tracing::debug!(graph = %graph.name, version = graph.version(), "decoded superseding snapshot");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::node::ports;
    use flowgraph_core::{ContainerKind, MemberData, NodeKind, PortRef, TypeName, Value};

    fn sample() -> Graph {
        let mut graph = Graph::new("sample");
        let speed = graph.add_variable("speed", TypeName::F32, Value::F32(2.5)).unwrap();
        let main = graph.container(ContainerKind::Main);
        let start = graph
            .add_node(main, "start", NodeKind::EventEntry { event: "Start".into() })
            .unwrap();
        let read = graph
            .add_node(
                main,
                "read speed",
                NodeKind::Member {
                    target: MemberData::variable(speed),
                    flow: false,
                },
            )
            .unwrap();
        let print = graph.add_node(main, "print", NodeKind::Print).unwrap();
        graph
            .connect(PortRef::new(start, ports::EXIT), PortRef::new(print, ports::ENTER))
            .unwrap();
        graph
            .connect(PortRef::new(read, ports::VALUE), PortRef::new(print, ports::VALUE))
            .unwrap();
        graph
    }

    #[test]
    fn round_trip_preserves_identity() {
        let graph = sample();
        let decoded = decode(&encode(&graph).unwrap()).unwrap();

        assert_eq!(decoded.uid(), graph.uid());
        assert_eq!(decoded.version(), graph.version());
        assert_eq!(decoded.walk(), graph.walk());
        let print = decoded.find_by_name("print").unwrap();
        let read = decoded.find_by_name("read speed").unwrap();
        assert_eq!(
            decoded.connected_peers(&PortRef::new(print, ports::VALUE)),
            vec![PortRef::new(read, ports::VALUE)]
        );
        let speed = decoded.find_by_name("speed").unwrap();
        match &decoded.node(read).unwrap().kind {
            NodeKind::Member { target, .. } => assert_eq!(*target, MemberData::variable(speed)),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn superseding_bumps_version() {
        let graph = sample();
        let bytes = encode(&graph).unwrap();
        let next = decode_superseding(&bytes, &graph).unwrap();
        assert_eq!(next.version(), graph.version() + 1);
        assert_eq!(next.uid(), graph.uid());
    }

    #[test]
    fn superseding_rejects_other_graph() {
        let graph = sample();
        let other = Graph::new("other");
        let err = decode_superseding(&encode(&other).unwrap(), &graph).unwrap_err();
        assert!(matches!(err, StorageError::ForeignPayload { .. }));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let graph = sample();
        let mut json: serde_json::Value = serde_json::from_slice(&encode(&graph).unwrap()).unwrap();
        json["format"] = serde_json::Value::from(99);
        let err = decode(&serde_json::to_vec(&json).unwrap()).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedFormat { found: 99, .. }));
    }

    #[test]
    fn stale_id_counters_are_repaired() {
        let graph = sample();
        let mut json: serde_json::Value = serde_json::from_slice(&encode(&graph).unwrap()).unwrap();
        json["graph"]["next_id"] = serde_json::Value::from(1);
        let mut decoded = decode(&serde_json::to_vec(&json).unwrap()).unwrap();

        let print = decoded.find_by_name("print").unwrap();
        let main = decoded.container(ContainerKind::Main);
        let fresh = decoded.add_node(main, "fresh", NodeKind::Print).unwrap();
        assert!(fresh.0 > print.0);
        assert_eq!(decoded.find_by_name("print"), Some(print));
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        assert!(matches!(decode(b"not json"), Err(StorageError::Serialization(_))));
    }
}
