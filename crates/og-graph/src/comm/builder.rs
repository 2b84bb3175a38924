use og_tensor::{partition_slices, Axes, Axis, DType};
use og_transport::Transport;

use crate::comm::{Channels, CommOp, CommOpKind};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{NodeId, Op};
use crate::placement::{Marker, Metadata, Placement};

/// Constructs communication ops in a graph.
///
/// With a transport attached, send-side ops allocate their channels at
/// construction. Every check runs before the first channel is created, so a
/// rejected op leaves neither a node nor a channel behind.
pub struct CommBuilder<'a> {
    graph: &'a mut Graph,
    transport: Option<&'a dyn Transport>,
}

impl<'a> CommBuilder<'a> {
    /// Builder for ops without channels.
    pub fn new(graph: &'a mut Graph) -> Self {
        CommBuilder {
            graph,
            transport: None,
        }
    }

    /// Builder for channel-backed ops.
    pub fn with_transport(graph: &'a mut Graph, transport: &'a dyn Transport) -> Self {
        CommBuilder {
            graph,
            transport: Some(transport),
        }
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// Send the value of `source` to a paired receiver.
    pub fn send(&mut self, source: NodeId) -> Result<NodeId> {
        let placement = self.placement(source)?;
        let (axes, dtype) = self.signature(source)?;
        let channels = self.create_channels(1);
        Ok(self.insert(
            CommOpKind::Send,
            channels,
            vec![source],
            axes,
            dtype,
            Metadata::placed(placement),
        ))
    }

    /// Receive, on `destination`'s device, the value sent by `send`.
    pub fn recv(&mut self, destination: NodeId, send: NodeId) -> Result<NodeId> {
        let placement = self.placement(destination)?;
        let (axes, dtype) = self.signature(destination)?;
        self.expect_kind(send, "send", |k| matches!(k, CommOpKind::Send))?;
        let channels = self.share_channels(send)?;
        Ok(self.insert(
            CommOpKind::Recv { send },
            channels,
            vec![],
            axes,
            dtype,
            Metadata::placed(placement),
        ))
    }

    /// Split `source` along `destination`'s parallel axis, one shard per
    /// destination device.
    pub fn scatter_send(&mut self, source: NodeId, destination: NodeId) -> Result<NodeId> {
        let placement = self.placement(source)?;
        let to_id = self.sharded_ids(destination)?;
        let parallel = self.parallel(destination)?;
        let (axes, dtype) = self.signature(source)?;
        let slices = partition_slices(&axes, &parallel, to_id.len())?;
        let channels = self.create_channels(to_id.len());
        Ok(self.insert(
            CommOpKind::ScatterSend { to_id, slices },
            channels,
            vec![source],
            axes,
            dtype,
            Metadata::placed(placement),
        ))
    }

    /// Receive shard `shard_index` of a scatter on `destination`'s device.
    pub fn scatter_recv(&mut self, destination: NodeId, scatter_send: NodeId, shard_index: usize) -> Result<NodeId> {
        let placement = self.placement(destination)?;
        let (axes, dtype) = self.signature(destination)?;
        let shards = match self.expect_kind(scatter_send, "scatter_send", |k| {
            matches!(k, CommOpKind::ScatterSend { .. })
        })? {
            CommOpKind::ScatterSend { to_id, .. } => to_id.len(),
            _ => 0,
        };
        if shard_index >= shards {
            return Err(GraphError::ShardOutOfRange {
                node: scatter_send,
                shard_index,
                shards,
            });
        }
        let channels = self.share_channels(scatter_send)?;
        Ok(self.insert(
            CommOpKind::ScatterRecv {
                send: scatter_send,
                shard_index,
            },
            channels,
            vec![],
            axes,
            dtype,
            Metadata::placed(placement),
        ))
    }

    /// Send shard 0 of a sharded `source` towards a gather. Channel-backed
    /// builders allocate one channel per source shard here.
    pub fn gather_send(&mut self, source: NodeId) -> Result<NodeId> {
        let placement = self.placement(source)?;
        let shard_count = self.sharded_ids(source)?.len();
        let parallel = self.parallel(source)?;
        let (axes, dtype) = self.signature(source)?;
        let channels = self.create_channels(shard_count);
        Ok(self.insert(
            CommOpKind::GatherSend {
                shard_index: 0,
                shard_count,
            },
            channels,
            vec![source],
            axes,
            dtype,
            Metadata::placed(placement).with_parallel(parallel),
        ))
    }

    /// Send shard `shard_index` of `source`, sharing the channels of the
    /// `first` gather send.
    pub fn gather_send_shard(&mut self, source: NodeId, first: NodeId, shard_index: usize) -> Result<NodeId> {
        let placement = self.placement(source)?;
        let parallel = self.parallel(source)?;
        let (axes, dtype) = self.signature(source)?;
        let shard_count = match self.expect_kind(first, "gather_send", |k| {
            matches!(k, CommOpKind::GatherSend { shard_index: 0, .. })
        })? {
            CommOpKind::GatherSend { shard_count, .. } => *shard_count,
            _ => 0,
        };
        if shard_index >= shard_count {
            return Err(GraphError::ShardOutOfRange {
                node: first,
                shard_index,
                shards: shard_count,
            });
        }
        let channels = self.share_channels(first)?;
        Ok(self.insert(
            CommOpKind::GatherSend {
                shard_index,
                shard_count,
            },
            channels,
            vec![source],
            axes,
            dtype,
            Metadata::placed(placement).with_parallel(parallel),
        ))
    }

    /// Reassemble the shards of `source` on `destination`'s device.
    pub fn gather_recv(&mut self, source: NodeId, destination: NodeId, gather_send: NodeId) -> Result<NodeId> {
        let placement = self.placement(destination)?;
        let parallel = self.parallel(source)?;
        let from_id = self.sharded_ids(source)?;
        let shard_count = match self.expect_kind(gather_send, "gather_send", |k| {
            matches!(k, CommOpKind::GatherSend { shard_index: 0, .. })
        })? {
            CommOpKind::GatherSend { shard_count, .. } => *shard_count,
            _ => 0,
        };
        if shard_count != from_id.len() {
            return Err(GraphError::ShardCountMismatch {
                node: gather_send,
                expected: from_id.len(),
                got: shard_count,
            });
        }
        if self.graph.node(gather_send)?.inputs() != [source] {
            return Err(GraphError::UnpairedSend {
                send: gather_send,
                origin: source,
            });
        }
        let (axes, dtype) = self.signature(destination)?;
        let slices = partition_slices(&axes, &parallel, from_id.len())?;
        let channels = self.share_channels(gather_send)?;

        let mut metadata = Metadata::placed(placement).with_parallel(parallel);
        metadata.marker = Some(Marker::Gather);
        Ok(self.insert(
            CommOpKind::GatherRecv {
                send: gather_send,
                from_id,
                slices,
            },
            channels,
            vec![],
            axes,
            dtype,
            metadata,
        ))
    }

    fn placement(&self, node: NodeId) -> Result<Placement> {
        self.graph
            .node(node)?
            .metadata()
            .placement
            .clone()
            .ok_or(GraphError::MissingPlacement(node))
    }

    fn sharded_ids(&self, node: NodeId) -> Result<Vec<usize>> {
        self.placement(node)?
            .device_id
            .as_sharded()
            .filter(|ids| !ids.is_empty())
            .map(<[usize]>::to_vec)
            .ok_or(GraphError::MalformedDeviceIds(node))
    }

    fn parallel(&self, node: NodeId) -> Result<Axis> {
        self.graph
            .node(node)?
            .metadata()
            .parallel
            .clone()
            .ok_or(GraphError::MissingParallelAxis(node))
    }

    fn signature(&self, node: NodeId) -> Result<(Axes, DType)> {
        let n = self.graph.node(node)?;
        Ok((n.axes().clone(), n.dtype()))
    }

    fn expect_kind(
        &self,
        node: NodeId,
        expected: &'static str,
        accept: impl Fn(&CommOpKind) -> bool,
    ) -> Result<&CommOpKind> {
        let n = self.graph.node(node)?;
        match n.comm() {
            Some(op) if accept(op.kind()) => Ok(op.kind()),
            _ => Err(GraphError::UnexpectedOp {
                node,
                expected,
                found: n.op().name(),
            }),
        }
    }

    fn create_channels(&self, count: usize) -> Channels {
        match self.transport {
            Some(transport) => Channels::Owned((0..count).map(|_| transport.create_channel()).collect()),
            None => Channels::None,
        }
    }

    fn share_channels(&self, owner: NodeId) -> Result<Channels> {
        let owned = self
            .graph
            .node(owner)?
            .comm()
            .is_some_and(|op| matches!(op.channels(), Channels::Owned(_)));
        Ok(if owned {
            Channels::Shared { owner }
        } else {
            Channels::None
        })
    }

    fn insert(
        &mut self,
        kind: CommOpKind,
        channels: Channels,
        inputs: Vec<NodeId>,
        axes: Axes,
        dtype: DType,
        metadata: Metadata,
    ) -> NodeId {
        let name = kind.name();
        let id = self.graph.push(
            Op::Communication(CommOp::new(kind, channels)),
            inputs,
            axes,
            dtype,
            metadata,
        );
        tracing::debug!(node = %id, op = name, "added communication op");
        id
    }
}
