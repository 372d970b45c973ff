// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use crate::TensorError;
use std::fmt;

/// Describes the dimensionality of a [`crate::Tensor`].
///
/// Dimensions are ordered outermost first, which is also the order the
/// offload codec flattens them in. Serialises as a bare list
/// (`[1, 32, 32, 32]`) so shapes read naturally in TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![1, 32, 32, 32]);
    /// assert_eq!(s.rank(), 4);
    /// assert_eq!(s.num_elements(), 32 * 32 * 32);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Creates a 4-D `[N, C, H, W]` shape.
    pub fn nchw(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self {
            dims: vec![n, c, h, w],
        }
    }

    /// Parses a comma-separated dimension list such as `"1,32,32,32"`.
    ///
    /// Whitespace around each dimension is ignored. Every dimension must be
    /// a positive integer.
    pub fn parse(s: &str) -> Result<Self, TensorError> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
        if trimmed.trim().is_empty() {
            return Err(TensorError::InvalidShape {
                input: s.to_string(),
                detail: "no dimensions given".into(),
            });
        }
        let dims = trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|e| TensorError::InvalidShape {
                        input: s.to_string(),
                        detail: format!("'{}': {e}", part.trim()),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let shape = Self::new(dims);
        if shape.has_zero_dim() {
            return Err(TensorError::InvalidShape {
                input: s.to_string(),
                detail: "dimensions must be positive".into(),
            });
        }
        Ok(shape)
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        if self.dims.is_empty() {
            1
        } else {
            self.dims.iter().product()
        }
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Returns `true` if any dimension is zero.
    pub fn has_zero_dim(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Like [`Shape::size_bytes`], but returns `None` instead of overflowing.
    pub fn checked_size_bytes(&self, dtype: super::DType) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(dtype.size_bytes(), |acc, &d| acc.checked_mul(d))
    }

    /// Returns `true` if the shapes are compatible for a matrix multiply:
    /// `self` is `[M, K]` and `other` is `[K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        if self.rank() != 2 || other.rank() != 2 {
            return false;
        }
        self.dims[1] == other.dims[0]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

/// Convenience: `Shape::from(&[2, 3][..])`.
impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
    }

    #[test]
    fn test_nchw_shape() {
        let s = Shape::nchw(1, 32, 32, 32);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.num_elements(), 32_768);
        assert_eq!(s.size_bytes(DType::F32), 131_072);
        assert_eq!(s.dim(1), Some(32));
        assert_eq!(s.dim(4), None);
    }

    #[test]
    fn test_checked_size_bytes() {
        let s = Shape::nchw(1, 32, 32, 32);
        assert_eq!(s.checked_size_bytes(DType::F32), Some(131_072));
        assert_eq!(Shape::scalar().checked_size_bytes(DType::I8), Some(1));
        let huge = Shape::new(vec![usize::MAX / 2, 3]);
        assert_eq!(huge.checked_size_bytes(DType::I8), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Shape::parse("1,32,32,32").unwrap(), Shape::nchw(1, 32, 32, 32));
        assert_eq!(Shape::parse(" [1, 10] ").unwrap(), Shape::matrix(1, 10));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Shape::parse("").is_err());
        assert!(Shape::parse("1,x,3").is_err());
        assert!(Shape::parse("1,0,3").is_err());
    }

    #[test]
    fn test_matmul_compatible() {
        let a = Shape::matrix(3, 4);
        let b = Shape::matrix(4, 5);
        assert!(a.is_matmul_compatible(&b));

        let c = Shape::matrix(5, 5);
        assert!(!a.is_matmul_compatible(&c));
        assert!(!Shape::vector(4).is_matmul_compatible(&b));
    }

    #[test]
    fn test_display() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(format!("{s}"), "[2, 3, 4]");
    }

    #[test]
    fn test_size_bytes() {
        let s = Shape::new(vec![10, 20]);
        assert_eq!(s.size_bytes(DType::F32), 800);
        assert_eq!(s.size_bytes(DType::F16), 400);
        assert_eq!(s.size_bytes(DType::I8), 200);
    }

    #[test]
    fn test_serde_is_a_plain_list() {
        let s = Shape::nchw(1, 3, 8, 8);
        assert_eq!(serde_json::to_string(&s).unwrap(), "[1,3,8,8]");
        let back: Shape = serde_json::from_str("[1,3,8,8]").unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_from_conversions() {
        let s1: Shape = vec![2, 3].into();
        let s2: Shape = (&[2, 3][..]).into();
        assert_eq!(s1, s2);
    }
}
