use std::collections::BTreeSet;
use std::fmt;

use og_tensor::{Axes, DType};

use crate::comm::CommOp;
use crate::conv::{ConvDerivOp, ConvolutionOp};
use crate::placement::Metadata;

/// Handle to a node inside its owning [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// A value supplied from outside the graph.
    Input { name: String },
    /// Copy of the single input in contiguous row-major layout.
    Contiguous,
    /// Element-wise sum of two inputs with equal axes.
    Add,
    Convolution(ConvolutionOp),
    /// Gradient of a convolution with respect to its filter.
    UpdateConv(ConvDerivOp),
    /// Gradient of a convolution with respect to its input.
    BpropConv(ConvDerivOp),
    Communication(CommOp),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Input { .. } => "input",
            Op::Contiguous => "contiguous",
            Op::Add => "add",
            Op::Convolution(_) => "convolution",
            Op::UpdateConv(_) => "update_conv",
            Op::BpropConv(_) => "bprop_conv",
            Op::Communication(c) => c.kind().name(),
        }
    }
}

/// One node of the computation DAG.
///
/// Inputs and control dependencies refer to other nodes of the same graph by
/// id; the graph owns every node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) op: Op,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) axes: Axes,
    pub(crate) dtype: DType,
    pub(crate) metadata: Metadata,
    pub(crate) control_deps: BTreeSet<NodeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Data inputs, in operand order.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Nodes that must run before this one in addition to its data inputs.
    pub fn control_deps(&self) -> &BTreeSet<NodeId> {
        &self.control_deps
    }

    pub fn is_communication(&self) -> bool {
        matches!(self.op, Op::Communication(_))
    }

    pub fn comm(&self) -> Option<&CommOp> {
        match &self.op {
            Op::Communication(c) => Some(c),
            _ => None,
        }
    }
}
