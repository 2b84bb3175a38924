use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("cannot partition an axis across zero devices")]
    ZeroDevices,
    #[error("expected {expected} slices (one per axis), got {got}")]
    SliceRankMismatch { expected: usize, got: usize },
    #[error("slice {start}..{stop} (step {step}) is out of bounds for axis '{axis}' of length {length}")]
    SliceOutOfBounds {
        axis: String,
        length: usize,
        start: usize,
        stop: usize,
        step: usize,
    },
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
