use std::collections::HashMap;

use og_tensor::Axes;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{NodeId, Op};
use crate::placement::Metadata;

/// Keys every convolution parameter mapping must provide.
pub const CONV_PARAM_KEYS: [&str; 9] = [
    "pad_h", "pad_w", "pad_d", "str_h", "str_w", "str_d", "dil_h", "dil_w", "dil_d",
];

/// Padding, stride, and dilation of a 3-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvParams {
    pub pad_h: usize,
    pub pad_w: usize,
    pub pad_d: usize,
    pub str_h: usize,
    pub str_w: usize,
    pub str_d: usize,
    pub dil_h: usize,
    pub dil_w: usize,
    pub dil_d: usize,
}

impl ConvParams {
    /// Parse parameters from a caller-supplied mapping.
    ///
    /// Reads the nine keys of [`CONV_PARAM_KEYS`], failing on the first one
    /// absent. No defaults are substituted. Other keys are ignored.
    pub fn from_mapping(params: &HashMap<String, usize>) -> Result<ConvParams> {
        let get = |key: &str| {
            params
                .get(key)
                .copied()
                .ok_or_else(|| GraphError::MissingConvParam(key.to_string()))
        };

        Ok(ConvParams {
            pad_h: get("pad_h")?,
            pad_w: get("pad_w")?,
            pad_d: get("pad_d")?,
            str_h: get("str_h")?,
            str_w: get("str_w")?,
            str_d: get("str_d")?,
            dil_h: get("dil_h")?,
            dil_w: get("dil_w")?,
            dil_d: get("dil_d")?,
        })
    }
}

/// A windowed 3-D convolution over rank-5 input and filter tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionOp {
    params: ConvParams,
    index: u64,
}

impl ConvolutionOp {
    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    /// Identifies this convolution instance among all drawn from the same counter.
    pub fn index(&self) -> u64 {
        self.index
    }
}

/// Shared state of the two convolution derivative ops.
///
/// Holds only the id of the forward convolution. Parameters and index are
/// read through the graph's forwarding, so a rewrite that replaces the
/// forward op is picked up automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvDerivOp {
    fprop: NodeId,
}

impl ConvDerivOp {
    /// The forward convolution as originally recorded.
    pub fn fprop(&self) -> NodeId {
        self.fprop
    }

    fn resolve<'g>(&self, graph: &'g Graph) -> Result<&'g ConvolutionOp> {
        let id = graph.forwarded(self.fprop);
        let node = graph.node(id)?;
        match node.op() {
            Op::Convolution(conv) => Ok(conv),
            other => Err(GraphError::UnexpectedOp {
                node: id,
                expected: "convolution",
                found: other.name(),
            }),
        }
    }

    pub fn conv_params<'g>(&self, graph: &'g Graph) -> Result<&'g ConvParams> {
        self.resolve(graph).map(ConvolutionOp::params)
    }

    pub fn index(&self, graph: &Graph) -> Result<u64> {
        self.resolve(graph).map(ConvolutionOp::index)
    }
}

impl Graph {
    /// Add a convolution of `input` with `filter` producing `axes`.
    ///
    /// Fails without touching the graph or the index counter if either
    /// operand is not rank 5, their leading (channel) axes differ, or a
    /// parameter is missing.
    pub fn convolution(
        &mut self,
        params: &HashMap<String, usize>,
        input: NodeId,
        filter: NodeId,
        axes: Axes,
    ) -> Result<NodeId> {
        let input_node = self.node(input)?;
        let filter_node = self.node(filter)?;

        if input_node.axes().len() != 5 {
            return Err(GraphError::InvalidRank {
                operand: "input",
                rank: input_node.axes().len(),
            });
        }
        if filter_node.axes().len() != 5 {
            return Err(GraphError::InvalidRank {
                operand: "filter",
                rank: filter_node.axes().len(),
            });
        }
        let input_channels = &input_node.axes().as_slice()[0];
        let filter_channels = &filter_node.axes().as_slice()[0];
        if input_channels != filter_channels {
            return Err(GraphError::AxisMismatch {
                input: input_channels.clone(),
                filter: filter_channels.clone(),
            });
        }
        let params = ConvParams::from_mapping(params)?;
        let dtype = input_node.dtype();

        let index = self.counter().next_index();
        let id = self.push(
            Op::Convolution(ConvolutionOp { params, index }),
            vec![input, filter],
            axes,
            dtype,
            Metadata::default(),
        );
        tracing::debug!(node = %id, index, "added convolution");
        Ok(id)
    }

    /// Filter gradient of convolution `fprop`, from contiguous copies of
    /// `delta` and `input`. Has the filter's axes.
    pub fn update_conv(&mut self, delta: NodeId, input: NodeId, filter: NodeId, fprop: NodeId) -> Result<NodeId> {
        let axes = self.node(filter)?.axes().clone();
        self.conv_deriv(delta, input, axes, fprop, Op::UpdateConv)
    }

    /// Input gradient of convolution `fprop`, from contiguous copies of
    /// `delta` and `filter`. Has the input's axes.
    pub fn bprop_conv(&mut self, delta: NodeId, input: NodeId, filter: NodeId, fprop: NodeId) -> Result<NodeId> {
        let axes = self.node(input)?.axes().clone();
        self.conv_deriv(delta, filter, axes, fprop, Op::BpropConv)
    }

    fn conv_deriv(
        &mut self,
        delta: NodeId,
        operand: NodeId,
        axes: Axes,
        fprop: NodeId,
        make: impl FnOnce(ConvDerivOp) -> Op,
    ) -> Result<NodeId> {
        let forward = self.node(fprop)?;
        if !matches!(forward.op(), Op::Convolution(_)) {
            return Err(GraphError::UnexpectedOp {
                node: fprop,
                expected: "convolution",
                found: forward.op().name(),
            });
        }
        let dtype = forward.dtype();

        let delta = self.contiguous(delta)?;
        let operand = self.contiguous(operand)?;
        let id = self.push(
            make(ConvDerivOp { fprop }),
            vec![delta, operand],
            axes,
            dtype,
            Metadata::default(),
        );
        // Reads state the forward op produces; it is not a data input.
        self.add_control_dep(id, fprop)?;
        Ok(id)
    }
}
