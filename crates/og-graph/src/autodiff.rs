//! Reverse-mode adjoint generation.
//!
//! Each op contributes the gradient of its inputs given the gradient of its
//! output (`delta`). Contributions for the same node are summed in an
//! [`Adjoints`] accumulator. Ops whose derivative reads state produced by the
//! forward op, like convolution, also add a control dependency from the
//! derivative op back to the forward op.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{NodeId, Op};

/// Accumulated gradient node per forward node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjoints {
    deltas: BTreeMap<NodeId, NodeId>,
}

impl Adjoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gradient accumulated so far for `node`.
    pub fn get(&self, node: NodeId) -> Option<NodeId> {
        self.deltas.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.deltas.iter().map(|(&k, &v)| (k, v))
    }
}

impl Graph {
    /// Accumulate `delta` as a gradient contribution to `target`.
    ///
    /// The first contribution is recorded as is; later ones are summed with
    /// an `Add` node.
    pub fn generate_add_delta(&mut self, adjoints: &mut Adjoints, target: NodeId, delta: NodeId) -> Result<()> {
        let expected = self.node(target)?.axes();
        let got = self.node(delta)?.axes();
        if expected != got {
            return Err(GraphError::AxesMismatch {
                expected: expected.clone(),
                got: got.clone(),
            });
        }
        let total = match adjoints.get(target) {
            Some(previous) => self.add(previous, delta)?,
            None => delta,
        };
        adjoints.deltas.insert(target, total);
        Ok(())
    }

    /// Ask `node` to contribute the adjoints of its inputs given `delta`, the
    /// gradient of its output.
    pub fn generate_adjoints(&mut self, node: NodeId, delta: NodeId, adjoints: &mut Adjoints) -> Result<()> {
        let forward = self.node(node)?;
        let got = self.node(delta)?.axes();
        if forward.axes() != got {
            return Err(GraphError::AxesMismatch {
                expected: forward.axes().clone(),
                got: got.clone(),
            });
        }
        let inputs = forward.inputs().to_vec();
        match forward.op().clone() {
            Op::Input { .. } => Ok(()),
            Op::Contiguous => self.generate_add_delta(adjoints, inputs[0], delta),
            Op::Add => {
                self.generate_add_delta(adjoints, inputs[0], delta)?;
                self.generate_add_delta(adjoints, inputs[1], delta)
            }
            Op::Convolution(_) => {
                let (input, filter) = (inputs[0], inputs[1]);
                let update = self.update_conv(delta, input, filter, node)?;
                let bprop = self.bprop_conv(delta, input, filter, node)?;
                tracing::debug!(node = %node, %update, %bprop, "generated convolution adjoints");
                self.generate_add_delta(adjoints, filter, update)?;
                self.generate_add_delta(adjoints, input, bprop)
            }
            other => Err(GraphError::NotDifferentiable {
                node,
                op: other.name(),
            }),
        }
    }
}

/// Build the backward pass of `output` seeded with `delta`.
///
/// Visits the data ancestors of `output` in reverse execution order so every
/// node's gradient is complete before it is propagated further.
pub fn differentiate(graph: &mut Graph, output: NodeId, delta: NodeId) -> Result<Adjoints> {
    let mut ancestors = BTreeSet::new();
    let mut stack = vec![output];
    while let Some(id) = stack.pop() {
        if ancestors.insert(id) {
            stack.extend_from_slice(graph.node(id)?.inputs());
        }
    }

    let order: Vec<NodeId> = graph
        .execution_order()?
        .into_iter()
        .filter(|id| ancestors.contains(id))
        .collect();

    let mut adjoints = Adjoints::new();
    graph.generate_add_delta(&mut adjoints, output, delta)?;
    for &id in order.iter().rev() {
        if let Some(grad) = adjoints.get(id) {
            graph.generate_adjoints(id, grad, &mut adjoints)?;
        }
    }
    Ok(adjoints)
}
