//! `og-graph` - Operation graph core for opgraph.
//!
//! This crate provides:
//! - `Graph`, an arena of operation nodes with data inputs and control dependencies
//! - Typed device placement metadata for nodes
//! - The convolution op, its two derivative ops, and the adjoint accumulation protocol
//! - Send/Recv and Scatter/Gather communication ops, their channel handoff, and a
//!   pass that inserts them on cross-device edges

pub mod autodiff;
pub mod comm;
pub mod conv;
pub mod error;
pub mod graph;
pub mod node;
pub mod placement;

pub use autodiff::{differentiate, Adjoints};
pub use comm::builder::CommBuilder;
pub use comm::exec::{recv_value, send_value};
pub use comm::pass::{insert_communication, InsertedComm};
pub use comm::{Channels, CommOp, CommOpKind};
pub use conv::{ConvDerivOp, ConvParams, ConvolutionOp, CONV_PARAM_KEYS};
pub use error::{GraphError, Result};
pub use graph::{ConvolutionCounter, Graph};
pub use node::{Node, NodeId, Op};
pub use placement::{DeviceIds, Marker, Metadata, Placement};
