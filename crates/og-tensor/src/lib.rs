//! `og-tensor` - Axis model, host tensor payloads, and axis partitioning for opgraph.
//!
//! This crate provides:
//! - `Axis` / `Axes`, the named and lengthed dimensions every graph node is described by
//! - `Slice`, a `start..stop` range with a step along one axis
//! - Partitioning of one axis across a fixed number of devices
//! - A host-side `Tensor` used as the value handed between devices
//! - Data type definitions (F32, F16, I32)

pub mod axis;
pub mod dtype;
pub mod error;
pub mod partition;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use axis::{Axes, Axis, Slice};
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use partition::{partition_axes, partition_slices, shard_bounds};
pub use storage::CpuStorage;
pub use tensor::Tensor;
