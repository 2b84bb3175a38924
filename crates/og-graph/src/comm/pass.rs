//! Rewrite cross-device edges into communication ops.

use std::collections::{BTreeSet, HashMap};

use og_tensor::partition_slices;
use og_transport::Transport;

use crate::comm::builder::CommBuilder;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::NodeId;
use crate::placement::DeviceIds;

/// Communication ops inserted for one producer-consumer edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertedComm {
    Direct { send: NodeId, recv: NodeId },
    /// One receiver per destination shard. `consumers[i]` reads `recvs[i]`;
    /// `consumers[0]` is the original consumer, the rest are its replicas.
    Scatter {
        send: NodeId,
        recvs: Vec<NodeId>,
        consumers: Vec<NodeId>,
    },
    /// One sender per source shard, each reading that shard's replica of the
    /// producer when it has them.
    Gather { sends: Vec<NodeId>, recv: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Direct,
    Scatter(usize),
    Gather(usize),
}

struct Edge {
    producer: NodeId,
    consumer: NodeId,
    kind: EdgeKind,
}

fn builder<'a>(graph: &'a mut Graph, transport: Option<&'a dyn Transport>) -> CommBuilder<'a> {
    match transport {
        Some(t) => CommBuilder::with_transport(graph, t),
        None => CommBuilder::new(graph),
    }
}

/// Check everything the builders will check for `edge`, without touching
/// the graph or allocating channels.
fn check_edge(graph: &Graph, edge: &Edge) -> Result<()> {
    let (sharded, single, shards) = match edge.kind {
        EdgeKind::Direct => return Ok(()),
        EdgeKind::Scatter(shards) => (edge.consumer, edge.producer, shards),
        EdgeKind::Gather(shards) => (edge.producer, edge.consumer, shards),
    };
    if shards == 0 {
        return Err(GraphError::MalformedDeviceIds(sharded));
    }
    let parallel = graph
        .node(sharded)?
        .metadata()
        .parallel
        .as_ref()
        .ok_or(GraphError::MissingParallelAxis(sharded))?;
    // Scatter slices the producer's value, gather assembles into the consumer's.
    partition_slices(graph.node(single)?.axes(), parallel, shards)?;
    Ok(())
}

fn cross_device_edges(graph: &Graph) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();
    for consumer in graph.nodes() {
        if consumer.is_communication() {
            continue;
        }
        let Some(to) = &consumer.metadata().placement else {
            continue;
        };
        let producers: BTreeSet<NodeId> = consumer.inputs().iter().copied().collect();
        for producer in producers {
            let p = graph.node(producer)?;
            if p.is_communication() {
                continue;
            }
            let Some(from) = &p.metadata().placement else {
                continue;
            };
            if from.same_devices(to) {
                continue;
            }
            let kind = match (&from.device_id, &to.device_id) {
                (DeviceIds::Single(_), DeviceIds::Sharded(ids)) => EdgeKind::Scatter(ids.len()),
                (DeviceIds::Sharded(ids), DeviceIds::Single(_)) => EdgeKind::Gather(ids.len()),
                _ => EdgeKind::Direct,
            };
            edges.push(Edge {
                producer,
                consumer: consumer.id(),
                kind,
            });
        }
    }
    Ok(edges)
}

/// Insert communication ops on every data edge whose endpoints are placed on
/// different devices, and rewire the consumer to read from the receiver.
///
/// Edges touching an unplaced node or an existing communication op are left
/// alone, so running the pass twice inserts nothing the second time. A
/// single-device producer feeding a sharded consumer becomes a scatter; a
/// sharded producer feeding a single-device consumer becomes a gather; every
/// other cross-device edge becomes a send/recv pair.
///
/// A scattered consumer is replicated once per shard so that every shard
/// receiver feeds a computation, and a later gather from that consumer sends
/// each replica's value. Every edge is checked before the first op is built:
/// on error the graph is unchanged and no channel has been allocated.
pub fn insert_communication(graph: &mut Graph, transport: Option<&dyn Transport>) -> Result<Vec<InsertedComm>> {
    let mut edges = cross_device_edges(graph)?;
    for edge in &edges {
        check_edge(graph, edge)?;
    }
    // Replicas must exist before a gather reads from them.
    edges.sort_by_key(|e| !matches!(e.kind, EdgeKind::Scatter(_)));

    let mut replicas: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut inserted = Vec::with_capacity(edges.len());
    for Edge {
        producer,
        consumer,
        kind,
    } in edges
    {
        let comm = match kind {
            EdgeKind::Direct => {
                let mut b = builder(graph, transport);
                let send = b.send(producer)?;
                let recv = b.recv(consumer, send)?;
                let readers = replicas.get(&consumer).cloned().unwrap_or_else(|| vec![consumer]);
                for reader in readers {
                    graph.replace_input(reader, producer, recv)?;
                }
                InsertedComm::Direct { send, recv }
            }
            EdgeKind::Scatter(shards) => {
                let consumers = match replicas.get(&consumer) {
                    Some(existing) => existing.clone(),
                    None => {
                        let mut all = vec![consumer];
                        for _ in 1..shards {
                            all.push(graph.replicate(consumer)?);
                        }
                        replicas.insert(consumer, all.clone());
                        all
                    }
                };
                let mut b = builder(graph, transport);
                let send = b.scatter_send(producer, consumer)?;
                let recvs = (0..shards)
                    .map(|i| b.scatter_recv(consumer, send, i))
                    .collect::<Result<Vec<_>>>()?;
                for (&reader, &recv) in consumers.iter().zip(&recvs) {
                    graph.replace_input(reader, producer, recv)?;
                }
                InsertedComm::Scatter { send, recvs, consumers }
            }
            EdgeKind::Gather(shards) => {
                let sources = replicas.get(&producer).cloned().unwrap_or_default();
                let mut b = builder(graph, transport);
                let first = b.gather_send(producer)?;
                let mut sends = vec![first];
                for i in 1..shards {
                    let source = sources.get(i).copied().unwrap_or(producer);
                    sends.push(b.gather_send_shard(source, first, i)?);
                }
                let recv = b.gather_recv(producer, consumer, first)?;
                graph.replace_input(consumer, producer, recv)?;
                InsertedComm::Gather { sends, recv }
            }
        };
        tracing::debug!(producer = %producer, consumer = %consumer, ?comm, "inserted communication");
        inserted.push(comm);
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommOpKind;
    use crate::placement::{Metadata, Placement};
    use og_tensor::{Axes, Axis, DType};
    use og_transport::InProcessTransport;

    fn axes() -> Axes {
        Axes::new(vec![Axis::new("N", 6)])
    }

    fn placed(g: &mut Graph, id: NodeId, placement: Placement) {
        *g.metadata_mut(id).unwrap() = Metadata::placed(placement);
    }

    #[test]
    fn test_direct_edge() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        placed(&mut g, y, Placement::single("cpu", 1, "cpu1", "host"));

        let inserted = insert_communication(&mut g, None).unwrap();
        let (send, recv) = match inserted.as_slice() {
            [InsertedComm::Direct { send, recv }] => (*send, *recv),
            other => panic!("unexpected insertion {:?}", other),
        };
        assert_eq!(g.node(send).unwrap().inputs(), &[x]);
        assert_eq!(g.node(y).unwrap().inputs(), &[recv]);
        assert_eq!(g.node(recv).unwrap().comm().unwrap().kind().paired_send(), Some(send));
    }

    #[test]
    fn test_same_device_and_unplaced_edges_skipped() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        let z = g.contiguous(y).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        placed(&mut g, y, Placement::single("cpu", 0, "other", "host"));

        assert!(insert_communication(&mut g, None).unwrap().is_empty());
        assert_eq!(g.node(z).unwrap().inputs(), &[y]);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_pass_is_idempotent() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let y = g.add(x, x).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        placed(&mut g, y, Placement::single("gpu", 0, "gpu0", "host"));

        let first = insert_communication(&mut g, None).unwrap();
        assert_eq!(first.len(), 1);
        let recv = match &first[0] {
            InsertedComm::Direct { recv, .. } => *recv,
            other => panic!("unexpected insertion {:?}", other),
        };
        // Both operand slots read the one receiver.
        assert_eq!(g.node(y).unwrap().inputs(), &[recv, recv]);

        let before = g.len();
        assert!(insert_communication(&mut g, None).unwrap().is_empty());
        assert_eq!(g.len(), before);
    }

    #[test]
    fn test_scatter_and_gather_edges() {
        let mut g = Graph::new();
        let n = Axis::new("N", 6);
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        let z = g.contiguous(y).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        *g.metadata_mut(y).unwrap() =
            Metadata::placed(Placement::sharded("gpu", vec![1, 2], "gpu", "host")).with_parallel(n);
        placed(&mut g, z, Placement::single("cpu", 0, "cpu0", "host"));

        let transport = InProcessTransport::unbounded();
        let inserted = insert_communication(&mut g, Some(&transport)).unwrap();
        assert_eq!(inserted.len(), 2);

        let consumers = match &inserted[0] {
            InsertedComm::Scatter { send, recvs, consumers } => {
                assert_eq!(recvs.len(), 2);
                assert_eq!(consumers.len(), 2);
                assert_eq!(consumers[0], y);
                for (&reader, &recv) in consumers.iter().zip(recvs) {
                    assert_eq!(g.node(reader).unwrap().inputs(), &[recv]);
                    assert_eq!(g.node(reader).unwrap().op(), g.node(y).unwrap().op());
                }
                assert!(matches!(
                    g.node(*send).unwrap().comm().unwrap().kind(),
                    CommOpKind::ScatterSend { .. }
                ));
                consumers.clone()
            }
            other => panic!("unexpected insertion {:?}", other),
        };
        match &inserted[1] {
            InsertedComm::Gather { sends, recv } => {
                assert_eq!(sends.len(), 2);
                // Shard i is sent from the replica that read shard i.
                for (&send, &reader) in sends.iter().zip(&consumers) {
                    assert_eq!(g.node(send).unwrap().inputs(), &[reader]);
                }
                assert_eq!(g.node(z).unwrap().inputs(), &[*recv]);
            }
            other => panic!("unexpected insertion {:?}", other),
        }
        // Two for the scatter, two for the gather.
        assert_eq!(transport.channel_count(), 4);
    }

    #[test]
    fn test_every_shard_receiver_has_a_user() {
        let mut g = Graph::new();
        let n = Axis::new("N", 6);
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        *g.metadata_mut(y).unwrap() =
            Metadata::placed(Placement::sharded("gpu", vec![1, 2, 3], "gpu", "host")).with_parallel(n);

        let inserted = insert_communication(&mut g, None).unwrap();
        let recvs = match inserted.as_slice() {
            [InsertedComm::Scatter { recvs, .. }] => recvs.clone(),
            other => panic!("unexpected insertion {:?}", other),
        };
        assert_eq!(recvs.len(), 3);
        for recv in recvs {
            assert_eq!(g.users(recv).len(), 1, "receiver {} feeds nothing", recv);
        }
        assert!(g.users(x).iter().all(|&u| g.node(u).unwrap().is_communication()));

        let before = g.len();
        assert!(insert_communication(&mut g, None).unwrap().is_empty());
        assert_eq!(g.len(), before);
    }

    #[test]
    fn test_sharded_consumer_without_parallel_axis() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        placed(&mut g, y, Placement::sharded("gpu", vec![1, 2], "gpu", "host"));

        let transport = InProcessTransport::unbounded();
        let err = insert_communication(&mut g, Some(&transport)).unwrap_err();
        assert_eq!(err, GraphError::MissingParallelAxis(y));
        assert_eq!(transport.channel_count(), 0);
        assert_eq!(g.node(y).unwrap().inputs(), &[x]);
    }

    #[test]
    fn test_failing_edge_leaves_earlier_edges_untouched() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let y = g.contiguous(x).unwrap();
        let w = g.contiguous(x).unwrap();
        placed(&mut g, x, Placement::single("cpu", 0, "cpu0", "host"));
        placed(&mut g, y, Placement::single("cpu", 1, "cpu1", "host"));
        placed(&mut g, w, Placement::sharded("gpu", vec![2, 3], "gpu", "host"));

        let transport = InProcessTransport::unbounded();
        let before = g.len();
        let err = insert_communication(&mut g, Some(&transport)).unwrap_err();
        assert_eq!(err, GraphError::MissingParallelAxis(w));
        assert_eq!(g.len(), before);
        assert_eq!(transport.channel_count(), 0);
        assert_eq!(g.node(y).unwrap().inputs(), &[x]);
        assert_eq!(g.node(w).unwrap().inputs(), &[x]);
    }

    #[test]
    fn test_gather_from_sharded_producer_without_parallel_axis() {
        let mut g = Graph::new();
        let x = g.input("x", axes(), DType::F32);
        let z = g.contiguous(x).unwrap();
        placed(&mut g, x, Placement::sharded("gpu", vec![1, 2], "gpu", "host"));
        placed(&mut g, z, Placement::single("cpu", 0, "cpu0", "host"));

        let transport = InProcessTransport::unbounded();
        let err = insert_communication(&mut g, Some(&transport)).unwrap_err();
        assert_eq!(err, GraphError::MissingParallelAxis(x));
        assert_eq!(transport.channel_count(), 0);
        assert_eq!(g.len(), 2);
    }
}
