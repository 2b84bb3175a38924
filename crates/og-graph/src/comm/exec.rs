//! Value handoff for channel-backed communication ops.
//!
//! Device workers call [`send_value`] on send-side ops and [`recv_value`] on
//! receive-side ops. Receives block until the paired send has delivered.

use og_tensor::{partition_axes, Slice, Tensor};
use og_transport::{ChannelId, Transport};

use crate::comm::CommOpKind;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{Node, NodeId};

fn comm_kind<'g>(node: &'g Node, expected: &'static str) -> Result<&'g CommOpKind> {
    node.comm().map(|op| op.kind()).ok_or(GraphError::UnexpectedOp {
        node: node.id(),
        expected,
        found: node.op().name(),
    })
}

fn backed_channels(graph: &Graph, node: NodeId) -> Result<&[ChannelId]> {
    let channels = graph.channels(node)?;
    if channels.is_empty() {
        return Err(GraphError::NotChannelBacked(node));
    }
    Ok(channels)
}

fn check_shard_count(node: NodeId, channels: &[ChannelId], slices: &[Vec<Slice>]) -> Result<()> {
    if channels.len() != slices.len() {
        return Err(GraphError::ShardCountMismatch {
            node,
            expected: slices.len(),
            got: channels.len(),
        });
    }
    Ok(())
}

/// Hand `value`, the computed value of a send-side op's input, to the
/// paired receiver(s).
///
/// A scatter send slices `value` and sends one shard per channel. A gather
/// send expects `value` to be its own shard of the sharded source.
pub fn send_value(graph: &Graph, node: NodeId, transport: &dyn Transport, value: Tensor) -> Result<()> {
    let n = graph.node(node)?;
    let kind = comm_kind(n, "send")?;
    let channels = backed_channels(graph, node)?;

    let expected = match kind {
        CommOpKind::GatherSend {
            shard_index,
            shard_count,
        } => {
            let parallel = n
                .metadata()
                .parallel
                .as_ref()
                .ok_or(GraphError::MissingParallelAxis(node))?;
            let shards = partition_axes(n.axes(), parallel, *shard_count)?;
            shards
                .get(*shard_index)
                .cloned()
                .ok_or(GraphError::ShardOutOfRange {
                    node,
                    shard_index: *shard_index,
                    shards: shards.len(),
                })?
        }
        _ => n.axes().clone(),
    };
    if value.axes().lengths() != expected.lengths() {
        return Err(GraphError::AxesMismatch {
            expected,
            got: value.axes().clone(),
        });
    }

    match kind {
        CommOpKind::Send | CommOpKind::GatherSend { .. } => {
            let channel = graph.channel_for(node)?;
            tracing::trace!(node = %node, %channel, "sending value");
            transport.send(channel, value)?;
        }
        CommOpKind::ScatterSend { slices, .. } => {
            check_shard_count(node, channels, slices)?;
            for (shard, (&channel, slice)) in channels.iter().zip(slices).enumerate() {
                tracing::trace!(node = %node, %channel, shard, "sending shard");
                transport.send(channel, value.slice(slice)?)?;
            }
        }
        other => {
            return Err(GraphError::UnexpectedOp {
                node,
                expected: "send",
                found: other.name(),
            })
        }
    }
    Ok(())
}

/// Block until the value for a receive-side op arrives and return it.
///
/// A gather receive collects every shard in shard order and assembles them
/// into a value with the op's axes.
pub fn recv_value(graph: &Graph, node: NodeId, transport: &dyn Transport) -> Result<Tensor> {
    let n = graph.node(node)?;
    let kind = comm_kind(n, "recv")?;
    let channels = backed_channels(graph, node)?;

    match kind {
        CommOpKind::Recv { .. } | CommOpKind::ScatterRecv { .. } => {
            let channel = graph.channel_for(node)?;
            tracing::trace!(node = %node, %channel, "waiting for value");
            Ok(transport.recv(channel)?)
        }
        CommOpKind::GatherRecv { slices, .. } => {
            check_shard_count(node, channels, slices)?;
            let mut out = Tensor::zeros(n.axes().clone(), n.dtype());
            for (shard, (&channel, slice)) in channels.iter().zip(slices).enumerate() {
                tracing::trace!(node = %node, %channel, shard, "waiting for shard");
                let part = transport.recv(channel)?;
                out.assign(slice, &part)?;
            }
            Ok(out)
        }
        other => Err(GraphError::UnexpectedOp {
            node,
            expected: "recv",
            found: other.name(),
        }),
    }
}
