//! Communication ops: explicit data movement between devices.
//!
//! A cross-device edge is replaced by a pair of ops, one on each side, that
//! hand the value off through a channel instead of a direct data dependency:
//!
//! | Kind | Side | Carries |
//! |---|---|---|
//! | `Send` / `Recv` | one device to one device | the whole value |
//! | `ScatterSend` / `ScatterRecv` | one device to N shards | one slice per shard |
//! | `GatherSend` / `GatherRecv` | N shards to one device | shards reassembled by slice |
//!
//! Channel-backed ops own their channels on the sending side (one per shard
//! for scatter and gather); the receiving side and sibling shards refer to the
//! owner by node id.

pub mod builder;
pub mod exec;
pub mod pass;

use og_tensor::Slice;
use og_transport::ChannelId;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::NodeId;

/// The role of a communication op and the data that role needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommOpKind {
    Send,
    Recv {
        send: NodeId,
    },
    ScatterSend {
        /// Destination device per shard.
        to_id: Vec<usize>,
        /// One slice per axis, per destination shard.
        slices: Vec<Vec<Slice>>,
    },
    ScatterRecv {
        send: NodeId,
        shard_index: usize,
    },
    GatherSend {
        shard_index: usize,
        shard_count: usize,
    },
    GatherRecv {
        send: NodeId,
        /// Source device per shard.
        from_id: Vec<usize>,
        /// Where each incoming shard lands in the reassembled value.
        slices: Vec<Vec<Slice>>,
    },
}

impl CommOpKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommOpKind::Send => "send",
            CommOpKind::Recv { .. } => "recv",
            CommOpKind::ScatterSend { .. } => "scatter_send",
            CommOpKind::ScatterRecv { .. } => "scatter_recv",
            CommOpKind::GatherSend { .. } => "gather_send",
            CommOpKind::GatherRecv { .. } => "gather_recv",
        }
    }

    /// The send-side op this receiver is paired with.
    pub fn paired_send(&self) -> Option<NodeId> {
        match self {
            CommOpKind::Recv { send }
            | CommOpKind::ScatterRecv { send, .. }
            | CommOpKind::GatherRecv { send, .. } => Some(*send),
            _ => None,
        }
    }

    /// Shard this op reads or writes; 0 for unsharded ops.
    pub fn shard_index(&self) -> usize {
        match self {
            CommOpKind::ScatterRecv { shard_index, .. } | CommOpKind::GatherSend { shard_index, .. } => {
                *shard_index
            }
            _ => 0,
        }
    }

    pub fn slices(&self) -> Option<&[Vec<Slice>]> {
        match self {
            CommOpKind::ScatterSend { slices, .. } | CommOpKind::GatherRecv { slices, .. } => Some(slices),
            _ => None,
        }
    }
}

/// Channels attached to a communication op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Channels {
    /// Not channel-backed.
    #[default]
    None,
    /// Created by this op, indexed by shard.
    Owned(Vec<ChannelId>),
    /// Owned by another op.
    Shared { owner: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommOp {
    kind: CommOpKind,
    channels: Channels,
}

impl CommOp {
    pub(crate) fn new(kind: CommOpKind, channels: Channels) -> Self {
        CommOp { kind, channels }
    }

    pub fn kind(&self) -> &CommOpKind {
        &self.kind
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }
}

impl Graph {
    fn comm_op(&self, node: NodeId) -> Result<&CommOp> {
        let n = self.node(node)?;
        n.comm().ok_or(GraphError::UnexpectedOp {
            node,
            expected: "communication",
            found: n.op().name(),
        })
    }

    /// Channels used by a communication op, following a shared reference to
    /// the owning op. Empty if the op is not channel-backed.
    pub fn channels(&self, node: NodeId) -> Result<&[ChannelId]> {
        match self.comm_op(node)?.channels() {
            Channels::None => Ok(&[]),
            Channels::Owned(ids) => Ok(ids),
            Channels::Shared { owner } => match self.comm_op(*owner)?.channels() {
                Channels::Owned(ids) => Ok(ids),
                _ => Ok(&[]),
            },
        }
    }

    /// The channel a single-channel op reads or writes, selected by its shard index.
    pub fn channel_for(&self, node: NodeId) -> Result<ChannelId> {
        let shard_index = self.comm_op(node)?.kind().shard_index();
        let channels = self.channels(node)?;
        channels
            .get(shard_index)
            .copied()
            .ok_or(GraphError::ShardOutOfRange {
                node,
                shard_index,
                shards: channels.len(),
            })
    }
}
