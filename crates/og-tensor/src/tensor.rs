use crate::axis::{Axes, Slice};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::storage::CpuStorage;

/// A host-resident tensor value.
///
/// Holds contiguous, row-major data described by named axes. This is the value
/// that crosses device boundaries through a channel; it carries no compute.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    axes: Axes,
}

impl Tensor {
    /// Create a tensor from storage and axes.
    ///
    /// # Errors
    /// Returns an error if the storage length does not match `axes.numel()`.
    pub fn new(storage: impl Into<CpuStorage>, axes: Axes) -> Result<Self> {
        let storage = storage.into();
        if storage.len() != axes.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: axes.lengths(),
                got: vec![storage.len()],
            });
        }
        Ok(Tensor { storage, axes })
    }

    /// Create a zero-filled tensor.
    pub fn zeros(axes: Axes, dtype: DType) -> Self {
        let n = axes.numel();
        Tensor {
            storage: CpuStorage::zeros(dtype, n),
            axes,
        }
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Returns the underlying data as an f32 slice, if the tensor is F32.
    pub fn data_f32(&self) -> Option<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Copy out the sub-tensor selected by one slice per axis.
    ///
    /// The result keeps the axis names; each length becomes the slice length.
    pub fn slice(&self, slices: &[Slice]) -> Result<Tensor> {
        self.check_slices(slices)?;
        let offsets = slice_offsets(&self.axes.strides(), slices);
        let axes = self
            .axes
            .iter()
            .zip(slices)
            .map(|(a, s)| a.with_length(s.len()))
            .collect();
        Ok(Tensor {
            storage: self.storage.gather(&offsets),
            axes,
        })
    }

    /// Overwrite the region selected by `slices` with the contents of `part`.
    ///
    /// `part` must have the same dtype and one axis per slice whose length is
    /// the slice length.
    pub fn assign(&mut self, slices: &[Slice], part: &Tensor) -> Result<()> {
        self.check_slices(slices)?;
        let expected: Vec<usize> = slices.iter().map(Slice::len).collect();
        if part.axes.lengths() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                got: part.axes.lengths(),
            });
        }
        let offsets = slice_offsets(&self.axes.strides(), slices);
        if !self.storage.scatter_from(&offsets, &part.storage) {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype().to_string(),
                got: part.dtype().to_string(),
            });
        }
        Ok(())
    }

    fn check_slices(&self, slices: &[Slice]) -> Result<()> {
        if slices.len() != self.axes.len() {
            return Err(TensorError::SliceRankMismatch {
                expected: self.axes.len(),
                got: slices.len(),
            });
        }
        for (axis, s) in self.axes.iter().zip(slices) {
            if s.step == 0 || s.start > s.stop || s.stop > axis.length() {
                return Err(TensorError::SliceOutOfBounds {
                    axis: axis.name().to_string(),
                    length: axis.length(),
                    start: s.start,
                    stop: s.stop,
                    step: s.step,
                });
            }
        }
        Ok(())
    }
}

/// Flat row-major offsets of every element selected by `slices`.
fn slice_offsets(strides: &[usize], slices: &[Slice]) -> Vec<usize> {
    let mut offsets = vec![0usize];
    for (slice, &stride) in slices.iter().zip(strides) {
        offsets = offsets
            .iter()
            .flat_map(|&base| slice.indices().map(move |i| base + i * stride))
            .collect();
    }
    offsets
}
