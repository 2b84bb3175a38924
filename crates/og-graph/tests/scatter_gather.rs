//! End-to-end tests for inserted communication ops.
//!
//! Builds a graph with a host value, a consumer sharded across devices, and a
//! host consumer of the sharded result, inserts communication ops, and runs
//! one worker thread per shard over an in-process transport.

use std::thread;

use og_graph::{
    insert_communication, recv_value, send_value, Graph, GraphError, InsertedComm, Metadata, NodeId, Placement,
};
use og_tensor::{Axes, Axis, DType, Tensor};
use og_transport::{InProcessTransport, Transport};
use proptest::prelude::*;

struct Pipeline {
    graph: Graph,
    scatter_send: NodeId,
    scatter_recvs: Vec<NodeId>,
    gather_sends: Vec<NodeId>,
    gather_recv: NodeId,
}

/// `x` on device 0 feeds `y` sharded over `devices` devices along N, which
/// feeds `z` back on device 0.
fn pipeline(length: usize, devices: usize, transport: &dyn Transport) -> Pipeline {
    let n = Axis::new("N", length);
    let axes = Axes::new(vec![Axis::new("C", 2), n.clone()]);
    let host = Placement::single("cpu", 0, "cpu0", "host");

    let mut graph = Graph::new();
    let x = graph.input("x", axes, DType::F32);
    let y = graph.contiguous(x).unwrap();
    let z = graph.contiguous(y).unwrap();
    *graph.metadata_mut(x).unwrap() = Metadata::placed(host.clone());
    *graph.metadata_mut(y).unwrap() =
        Metadata::placed(Placement::sharded("gpu", (1..=devices).collect(), "gpu", "host")).with_parallel(n);
    *graph.metadata_mut(z).unwrap() = Metadata::placed(host);

    let inserted = insert_communication(&mut graph, Some(transport)).unwrap();
    let (scatter_send, scatter_recvs) = match &inserted[0] {
        InsertedComm::Scatter { send, recvs, .. } => (*send, recvs.clone()),
        other => panic!("expected a scatter, got {:?}", other),
    };
    let (gather_sends, gather_recv) = match &inserted[1] {
        InsertedComm::Gather { sends, recv } => (sends.clone(), *recv),
        other => panic!("expected a gather, got {:?}", other),
    };
    Pipeline {
        graph,
        scatter_send,
        scatter_recvs,
        gather_sends,
        gather_recv,
    }
}

fn host_value(length: usize) -> Tensor {
    let data: Vec<f32> = (0..2 * length).map(|i| i as f32).collect();
    Tensor::new(data, Axes::new(vec![Axis::new("C", 2), Axis::new("N", length)])).unwrap()
}

#[test]
fn test_scatter_gather_across_threads() {
    let transport = InProcessTransport::unbounded();
    let p = pipeline(10, 3, &transport);
    let value = host_value(10);

    let (shard_lengths, gathered) = thread::scope(|s| {
        let workers: Vec<_> = p
            .scatter_recvs
            .iter()
            .zip(&p.gather_sends)
            .map(|(&recv, &send)| {
                let (graph, transport) = (&p.graph, &transport);
                s.spawn(move || {
                    let shard = recv_value(graph, recv, transport).unwrap();
                    let length = shard.axes().get(1).unwrap().length();
                    send_value(graph, send, transport, shard).unwrap();
                    length
                })
            })
            .collect();

        send_value(&p.graph, p.scatter_send, &transport, value.clone()).unwrap();
        let gathered = recv_value(&p.graph, p.gather_recv, &transport).unwrap();
        let lengths: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        (lengths, gathered)
    });

    // The last device takes the remainder.
    assert_eq!(shard_lengths, vec![3, 3, 4]);
    assert_eq!(gathered, value);
}

#[test]
fn test_bounded_channels() {
    let transport = InProcessTransport::bounded(1);
    let p = pipeline(7, 2, &transport);
    let value = host_value(7);

    let gathered = thread::scope(|s| {
        for (&recv, &send) in p.scatter_recvs.iter().zip(&p.gather_sends) {
            let (graph, transport) = (&p.graph, &transport);
            s.spawn(move || {
                let shard = recv_value(graph, recv, transport).unwrap();
                send_value(graph, send, transport, shard).unwrap();
            });
        }
        send_value(&p.graph, p.scatter_send, &transport, value.clone()).unwrap();
        recv_value(&p.graph, p.gather_recv, &transport).unwrap()
    });
    assert_eq!(gathered, value);
}

#[test]
fn test_gather_rejects_wrong_shard_shape() {
    let transport = InProcessTransport::unbounded();
    let p = pipeline(10, 3, &transport);
    // Shard 2 carries the remainder, so a 3-wide value does not fit it.
    let shard = Tensor::zeros(Axes::new(vec![Axis::new("C", 2), Axis::new("N", 3)]), DType::F32);
    let err = send_value(&p.graph, p.gather_sends[2], &transport, shard).unwrap_err();
    assert!(matches!(err, GraphError::AxesMismatch { .. }));
}

#[test]
fn test_misconfigured_scatter_allocates_no_channels() {
    let transport = InProcessTransport::unbounded();
    let axes = Axes::new(vec![Axis::new("N", 4)]);
    let mut graph = Graph::new();
    let x = graph.input("x", axes, DType::F32);
    let y = graph.contiguous(x).unwrap();
    *graph.metadata_mut(x).unwrap() = Metadata::placed(Placement::single("cpu", 0, "cpu0", "host"));
    *graph.metadata_mut(y).unwrap() = Metadata::placed(Placement::sharded("gpu", vec![1, 2], "gpu", "host"));

    let before = graph.len();
    let err = insert_communication(&mut graph, Some(&transport)).unwrap_err();
    assert_eq!(err, GraphError::MissingParallelAxis(y));
    assert_eq!(transport.channel_count(), 0);
    assert_eq!(graph.len(), before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Scatter then gather restores the host value for any split, including
    /// more devices than elements.
    #[test]
    fn scatter_then_gather_restores_value(length in 0usize..=40, devices in 1usize..=6) {
        let transport = InProcessTransport::unbounded();
        let p = pipeline(length, devices, &transport);
        let value = host_value(length);

        // Unbounded channels let a single thread play every device in turn.
        send_value(&p.graph, p.scatter_send, &transport, value.clone()).unwrap();
        for (&recv, &send) in p.scatter_recvs.iter().zip(&p.gather_sends) {
            let shard = recv_value(&p.graph, recv, &transport).unwrap();
            send_value(&p.graph, send, &transport, shard).unwrap();
        }
        let gathered = recv_value(&p.graph, p.gather_recv, &transport).unwrap();
        prop_assert_eq!(gathered, value);
    }
}
