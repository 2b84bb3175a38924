use og_tensor::{Axes, Axis};
use thiserror::Error;

use crate::node::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("convolution {operand} must have rank 5, found {rank}")]
    InvalidRank { operand: &'static str, rank: usize },
    #[error("the first axis in input {input} and filter {filter} are not the same")]
    AxisMismatch { input: Axis, filter: Axis },
    #[error("expected parameter {0} not present in convolution parameters")]
    MissingConvParam(String),
    #[error("axes mismatch: expected {expected}, got {got}")]
    AxesMismatch { expected: Axes, got: Axes },
    #[error("node {0} has no device placement")]
    MissingPlacement(NodeId),
    #[error("node {0} has no parallel axis")]
    MissingParallelAxis(NodeId),
    #[error("node {0} must carry one device id per shard")]
    MalformedDeviceIds(NodeId),
    #[error("node {node} is a {found} op, expected {expected}")]
    UnexpectedOp {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },
    #[error("shard index {shard_index} out of range for node {node} with {shards} shards")]
    ShardOutOfRange {
        node: NodeId,
        shard_index: usize,
        shards: usize,
    },
    #[error("node {node} has {got} shards, expected {expected}")]
    ShardCountMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("communication op {send} does not read from {origin}")]
    UnpairedSend { send: NodeId, origin: NodeId },
    #[error("node {0} has no channels to exchange values on")]
    NotChannelBacked(NodeId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} ({op}) has no adjoint")]
    NotDifferentiable { node: NodeId, op: &'static str },
    #[error("forwarding {from} to {to} would create a cycle")]
    ForwardingCycle { from: NodeId, to: NodeId },
    #[error("graph contains a dependency cycle")]
    CycleDetected,
    #[error("tensor error: {0}")]
    Tensor(#[from] og_tensor::TensorError),
    #[error("transport error: {0}")]
    Transport(#[from] og_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
