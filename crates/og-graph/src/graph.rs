use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use og_tensor::{Axes, DType};

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId, Op};
use crate::placement::Metadata;

/// Source of convolution indices.
///
/// Cloning shares the underlying counter, so several graphs built in the same
/// context draw from one monotonically increasing sequence.
#[derive(Debug, Clone, Default)]
pub struct ConvolutionCounter {
    next: Arc<AtomicU64>,
}

impl ConvolutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next index.
    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The index the next convolution will receive.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Arena of operation nodes.
///
/// Nodes are appended and never removed; ids stay valid for the graph's
/// lifetime. A node may be forwarded to a replacement by a rewrite, after
/// which [`Graph::forwarded`] resolves the original id to the replacement.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    forwarding: HashMap<NodeId, NodeId>,
    counter: ConvolutionCounter,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph drawing convolution indices from a shared counter.
    pub fn with_counter(counter: ConvolutionCounter) -> Self {
        Graph {
            counter,
            ..Default::default()
        }
    }

    pub fn counter(&self) -> &ConvolutionCounter {
        &self.counter
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Look up a node, failing on ids from another graph.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))
    }

    /// Mutable access to a node's metadata, for device-assignment passes.
    pub fn metadata_mut(&mut self, id: NodeId) -> Result<&mut Metadata> {
        Ok(&mut self.node_mut(id)?.metadata)
    }

    pub(crate) fn push(
        &mut self,
        op: Op,
        inputs: Vec<NodeId>,
        axes: Axes,
        dtype: DType,
        metadata: Metadata,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            op,
            inputs,
            axes,
            dtype,
            metadata,
            control_deps: BTreeSet::new(),
        });
        id
    }

    /// Append a copy of `id` with the same op, inputs, metadata and control
    /// dependencies.
    pub(crate) fn replicate(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.node(id)?.clone();
        let copy = self.push(node.op, node.inputs, node.axes, node.dtype, node.metadata);
        self.node_mut(copy)?.control_deps = node.control_deps;
        Ok(copy)
    }

    /// Add an external input value.
    pub fn input(&mut self, name: impl Into<String>, axes: Axes, dtype: DType) -> NodeId {
        self.push(
            Op::Input { name: name.into() },
            vec![],
            axes,
            dtype,
            Metadata::default(),
        )
    }

    /// Contiguous copy of `x`.
    pub fn contiguous(&mut self, x: NodeId) -> Result<NodeId> {
        let node = self.node(x)?;
        let (axes, dtype) = (node.axes.clone(), node.dtype);
        Ok(self.push(Op::Contiguous, vec![x], axes, dtype, Metadata::default()))
    }

    /// Element-wise `a + b`; both operands must have equal axes.
    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let lhs = self.node(a)?;
        let rhs = self.node(b)?;
        if lhs.axes != rhs.axes {
            return Err(GraphError::AxesMismatch {
                expected: lhs.axes.clone(),
                got: rhs.axes.clone(),
            });
        }
        let (axes, dtype) = (lhs.axes.clone(), lhs.dtype);
        Ok(self.push(Op::Add, vec![a, b], axes, dtype, Metadata::default()))
    }

    /// Require `dep` to run before `node`.
    pub fn add_control_dep(&mut self, node: NodeId, dep: NodeId) -> Result<()> {
        self.node(dep)?;
        self.node_mut(node)?.control_deps.insert(dep);
        Ok(())
    }

    /// Replace every occurrence of `old` in `consumer`'s inputs with `new`.
    ///
    /// Returns how many operand slots were rewired.
    pub fn replace_input(&mut self, consumer: NodeId, old: NodeId, new: NodeId) -> Result<usize> {
        self.node(new)?;
        let node = self.node_mut(consumer)?;
        let mut replaced = 0;
        for input in node.inputs.iter_mut().filter(|i| **i == old) {
            *input = new;
            replaced += 1;
        }
        Ok(replaced)
    }

    /// Nodes that take `id` as a data input.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.inputs.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Record that `old` has been replaced by `new`.
    ///
    /// Re-forwarding `old` replaces its previous target. Fails if `old` is
    /// reachable from `new`, which would close a cycle.
    pub fn forward_to(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        self.node(old)?;
        self.node(new)?;
        let mut current = new;
        loop {
            if current == old {
                return Err(GraphError::ForwardingCycle { from: old, to: new });
            }
            match self.forwarding.get(&current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        self.forwarding.insert(old, new);
        Ok(())
    }

    /// Resolve `id` through the forwarding chain to the node currently standing in for it.
    pub fn forwarded(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(&next) = self.forwarding.get(&current) {
            current = next;
        }
        current
    }

    /// A topological order over all nodes honouring data inputs and control
    /// dependencies. Ties are broken by node id.
    pub fn execution_order(&self) -> Result<Vec<NodeId>> {
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for node in &self.nodes {
            let deps: BTreeSet<NodeId> = node
                .inputs
                .iter()
                .chain(node.control_deps.iter())
                .copied()
                .collect();
            pending[node.id.0] = deps.len();
            for dep in deps {
                dependents[dep.0].push(node.id);
            }
        }

        let mut ready: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|n| pending[n.id.0] == 0)
            .map(|n| n.id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &next in &dependents[id.0] {
                pending[next.0] -= 1;
                if pending[next.0] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::CycleDetected);
        }
        Ok(order)
    }
}
