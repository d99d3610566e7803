use crate::error::{Result, TensorError};
use std::fmt;

/// A tensor shape, wrapping a vector of dimension extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Create a shape from a slice of dimensions.
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A rank-0 shape holds one element.
    pub fn numel(&self) -> usize {
        if self.dims.contains(&0) {
            return 0;
        }
        self.dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Returns the extent of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major contiguous strides for this shape.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        contiguous_strides(&self.dims)
    }

    /// Validating broadcast: like [`infer_broadcast_shape`] but rejects aligned
    /// extents that differ while both are larger than one.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        check_broadcastable(&a.dims, &b.dims)?;
        Ok(Shape::new(infer_broadcast_shape(&a.dims, &b.dims)))
    }
}

/// Row-major strides for `dims`.
pub fn contiguous_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut acc = 1usize;
    for i in (0..dims.len()).rev() {
        strides[i] = acc;
        acc = acc.saturating_mul(dims[i]);
    }
    strides
}

/// Right-aligns both shapes and merges them NumPy-style.
///
/// Missing leading dimensions count as extent 1 and an extent of 1 yields to
/// the other operand (even 0). Mismatched non-1 extents are not rejected here;
/// the left operand wins. Use [`check_broadcastable`] or
/// [`Shape::broadcast_shape`] when compatibility has to be enforced.
pub fn infer_broadcast_shape(a: &[usize], b: &[usize]) -> Vec<usize> {
    let ndim = a.len().max(b.len());
    let mut expanded = vec![0usize; ndim];
    for (offset, slot) in expanded.iter_mut().rev().enumerate() {
        let da = aligned_dim(a, offset);
        let db = aligned_dim(b, offset);
        *slot = if da == 1 { db } else { da };
    }
    expanded
}

/// Rejects shapes whose aligned extents differ while both exceed one.
pub fn check_broadcastable(a: &[usize], b: &[usize]) -> Result<()> {
    for offset in 0..a.len().max(b.len()) {
        let da = aligned_dim(a, offset);
        let db = aligned_dim(b, offset);
        if da != db && da != 1 && db != 1 {
            return Err(TensorError::BroadcastError {
                a: a.to_vec(),
                b: b.to_vec(),
            });
        }
    }
    Ok(())
}

// Extent `offset` positions from the right, 1 when the shape is too short.
fn aligned_dim(dims: &[usize], offset: usize) -> usize {
    if offset < dims.len() {
        dims[dims.len() - 1 - offset]
    } else {
        1
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}
