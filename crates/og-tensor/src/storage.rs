use half::f16;

use crate::dtype::DType;

/// Row-major host storage for a tensor payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F16(Vec<f16>),
    I32(Vec<i32>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F16(v) => v.len(),
            CpuStorage::I32(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::I32 => CpuStorage::I32(vec![0; n]),
        }
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::I32(_) => DType::I32,
        }
    }

    /// Returns the data as an f32 slice, if this is F32 storage.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            CpuStorage::F32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the data as an f16 slice, if this is F16 storage.
    pub fn as_f16_slice(&self) -> Option<&[f16]> {
        match self {
            CpuStorage::F16(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the data as an i32 slice, if this is I32 storage.
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        match self {
            CpuStorage::I32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Gather the elements at `offsets` into new storage of the same dtype.
    pub(crate) fn gather(&self, offsets: &[usize]) -> Self {
        match self {
            CpuStorage::F32(v) => CpuStorage::F32(offsets.iter().map(|&o| v[o]).collect()),
            CpuStorage::F16(v) => CpuStorage::F16(offsets.iter().map(|&o| v[o]).collect()),
            CpuStorage::I32(v) => CpuStorage::I32(offsets.iter().map(|&o| v[o]).collect()),
        }
    }

    /// Write `src` element `i` to position `offsets[i]`. Dtypes must match.
    pub(crate) fn scatter_from(&mut self, offsets: &[usize], src: &CpuStorage) -> bool {
        match (self, src) {
            (CpuStorage::F32(dst), CpuStorage::F32(src)) => {
                offsets.iter().zip(src).for_each(|(&o, &x)| dst[o] = x);
                true
            }
            (CpuStorage::F16(dst), CpuStorage::F16(src)) => {
                offsets.iter().zip(src).for_each(|(&o, &x)| dst[o] = x);
                true
            }
            (CpuStorage::I32(dst), CpuStorage::I32(src)) => {
                offsets.iter().zip(src).for_each(|(&o, &x)| dst[o] = x);
                true
            }
            _ => false,
        }
    }
}

impl From<Vec<f32>> for CpuStorage {
    fn from(data: Vec<f32>) -> Self {
        CpuStorage::F32(data)
    }
}

impl From<Vec<f16>> for CpuStorage {
    fn from(data: Vec<f16>) -> Self {
        CpuStorage::F16(data)
    }
}

impl From<Vec<i32>> for CpuStorage {
    fn from(data: Vec<i32>) -> Self {
        CpuStorage::I32(data)
    }
}
