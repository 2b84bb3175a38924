use std::fmt;

/// A named, lengthed dimension of a tensor-shaped value.
///
/// Axes are immutable once created. Two axes compare equal only when both the
/// name and the length match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Axis {
    name: String,
    length: usize,
}

impl Axis {
    /// Create a new axis.
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Axis {
            name: name.into(),
            length,
        }
    }

    /// The axis name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of elements along this axis.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns an axis with the same name and a different length.
    pub fn with_length(&self, length: usize) -> Self {
        Axis {
            name: self.name.clone(),
            length,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.length)
    }
}

/// An ordered sequence of axes describing a tensor's full shape.
///
/// Order maps to the dimension order of the associated tensor. No uniqueness
/// of names is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Axes {
    axes: Vec<Axis>,
}

impl Axes {
    /// Create axes from a vector of axis values.
    pub fn new(axes: Vec<Axis>) -> Self {
        Axes { axes }
    }

    /// Scalar (rank 0) axes.
    pub fn scalar() -> Self {
        Axes { axes: Vec::new() }
    }

    /// Number of axes (rank).
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    /// Returns true for rank-0 axes.
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Returns the axis at position `i`, if any.
    pub fn get(&self, i: usize) -> Option<&Axis> {
        self.axes.get(i)
    }

    /// The leading axis, if any.
    pub fn first(&self) -> Option<&Axis> {
        self.axes.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Axis> {
        self.axes.iter()
    }

    pub fn as_slice(&self) -> &[Axis] {
        &self.axes
    }

    /// Position of the first axis equal to `axis`.
    pub fn position(&self, axis: &Axis) -> Option<usize> {
        self.axes.iter().position(|a| a == axis)
    }

    /// Returns true if any axis equals `axis`.
    pub fn contains(&self, axis: &Axis) -> bool {
        self.position(axis).is_some()
    }

    /// Lengths of each axis, in order.
    pub fn lengths(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::length).collect()
    }

    /// Total number of elements (product of all axis lengths).
    pub fn numel(&self) -> usize {
        self.axes.iter().map(Axis::length).product()
    }

    /// Computes row-major contiguous strides for these axes.
    ///
    /// For lengths [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.axes.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.axes.len()];
        strides[self.axes.len() - 1] = 1;
        for i in (0..self.axes.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.axes[i + 1].length;
        }
        strides
    }

    /// Identity slices covering every axis in full.
    pub fn full_slices(&self) -> Vec<Slice> {
        self.axes.iter().map(|a| Slice::full(a.length)).collect()
    }
}

impl fmt::Display for Axes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, a) in self.axes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", a)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Axis>> for Axes {
    fn from(axes: Vec<Axis>) -> Self {
        Axes::new(axes)
    }
}

impl FromIterator<Axis> for Axes {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        Axes::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Axes {
    type Item = &'a Axis;
    type IntoIter = std::slice::Iter<'a, Axis>;

    fn into_iter(self) -> Self::IntoIter {
        self.axes.iter()
    }
}

/// A `start..stop` range with a step along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slice {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl Slice {
    pub fn new(start: usize, stop: usize, step: usize) -> Self {
        Slice { start, stop, step }
    }

    /// The identity slice over an axis of the given length.
    pub fn full(length: usize) -> Self {
        Slice {
            start: 0,
            stop: length,
            step: 1,
        }
    }

    /// Number of elements selected by this slice.
    pub fn len(&self) -> usize {
        if self.stop <= self.start || self.step == 0 {
            return 0;
        }
        (self.stop - self.start).div_ceil(self.step)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the selected indices. Yields exactly [`Slice::len`]
    /// indices, so a zero step selects nothing.
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        (self.start..self.stop).step_by(self.step.max(1)).take(self.len())
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nchw() -> Axes {
        Axes::new(vec![
            Axis::new("N", 2),
            Axis::new("C", 3),
            Axis::new("W", 4),
        ])
    }

    #[test]
    fn test_axis_equality_uses_length() {
        assert_eq!(Axis::new("N", 4), Axis::new("N", 4));
        assert_ne!(Axis::new("N", 4), Axis::new("N", 5));
        assert_ne!(Axis::new("N", 4), Axis::new("M", 4));
    }

    #[test]
    fn test_basic_axes() {
        let axes = nchw();
        assert_eq!(axes.len(), 3);
        assert_eq!(axes.numel(), 24);
        assert_eq!(axes.lengths(), vec![2, 3, 4]);
        assert_eq!(axes.first(), Some(&Axis::new("N", 2)));
        assert_eq!(axes.position(&Axis::new("W", 4)), Some(2));
        assert_eq!(axes.position(&Axis::new("W", 5)), None);
    }

    #[test]
    fn test_strides() {
        assert_eq!(nchw().strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_scalar_axes() {
        let s = Axes::scalar();
        assert!(s.is_empty());
        assert_eq!(s.numel(), 1); // product of empty = 1
        assert_eq!(s.strides(), vec![]);
    }

    #[test]
    fn test_display() {
        assert_eq!(nchw().to_string(), "(N[2], C[3], W[4])");
    }

    #[test]
    fn test_slice_len() {
        assert_eq!(Slice::full(7).len(), 7);
        assert_eq!(Slice::new(3, 6, 1).len(), 3);
        assert_eq!(Slice::new(0, 7, 2).len(), 4);
        assert!(Slice::new(4, 4, 1).is_empty());
        assert_eq!(Slice::new(1, 7, 3).indices().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn test_zero_step_selects_nothing() {
        let s = Slice::new(0, 5, 0);
        assert_eq!(s.len(), 0);
        assert!(s.is_empty());
        assert_eq!(s.indices().count(), 0);
        for s in [Slice::new(2, 9, 2), Slice::new(5, 3, 1), Slice::full(4)] {
            assert_eq!(s.indices().count(), s.len(), "{}", s);
        }
    }
}
