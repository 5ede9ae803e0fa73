// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Pure Rust dense tensor primitives with only lightweight external
//! dependencies.
//!
//! The goal of this crate is to offer a pragmatic numeric foundation for the
//! ModalTorch learning stack that **does not rely on PyTorch, NumPy, or any
//! other native bindings**. Tensors are two-dimensional and row-major: the
//! batch axis runs along rows while per-sample features are flattened along
//! columns, so the same storage serves dense vectors, channel-major images,
//! volumetric grids, and spectrogram frames alike.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the tensor crate.
pub type TensorResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor constructors and operators.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    #[error("invalid tensor dimensions: {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor does not match the tensor shape.
    #[error("data length mismatch: expected {expected}, got {got}")]
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    #[error("shape mismatch: left {left:?}, right {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Computation received an empty input which would otherwise panic.
    #[error("empty input passed to {0}")]
    EmptyInput(&'static str),
    /// Attempted to restore a parameter missing from a state dictionary.
    #[error("missing parameter in state dict: {name}")]
    MissingParameter { name: String },
    /// Generic configuration violation inside a numeric helper.
    #[error("invalid value for {label}")]
    InvalidValue { label: &'static str },
}

/// Dense row-major matrix of `f32` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        })
    }

    /// Creates a tensor from an owning vector laid out row-major.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if data.len() != rows * cols {
            return Err(TensorError::DataLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Creates a tensor by evaluating `f(row, col)` for every element.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> TensorResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Ok(Self { rows, cols, data })
    }

    /// Samples every element uniformly from `[0, 1)` using the caller's RNG.
    pub fn random_uniform<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let data = (0..rows * cols).map(|_| rng.gen::<f32>()).collect();
        Self::from_vec(rows, cols, data)
    }

    /// Samples every element from a normal distribution.
    pub fn random_normal<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        mean: f32,
        std_dev: f32,
        rng: &mut R,
    ) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let normal = rand_distr::Normal::new(mean, std_dev).map_err(|_| {
            TensorError::InvalidValue {
                label: "normal_std_dev",
            }
        })?;
        let data = (0..rows * cols)
            .map(|_| rand_distr::Distribution::sample(&normal, rng))
            .collect();
        Self::from_vec(rows, cols, data)
    }

    /// Returns the `(rows, cols)` shape tuple.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Immutable view of the underlying storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view of the underlying storage.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Immutable view of a single row.
    pub fn row(&self, index: usize) -> TensorResult<&[f32]> {
        if index >= self.rows {
            return Err(TensorError::InvalidDimensions {
                rows: index,
                cols: self.cols,
            });
        }
        Ok(&self.data[index * self.cols..(index + 1) * self.cols])
    }

    /// Copies rows `[start, end)` into a new tensor.
    pub fn slice_rows(&self, start: usize, end: usize) -> TensorResult<Tensor> {
        if start >= end || end > self.rows {
            return Err(TensorError::InvalidDimensions {
                rows: end.saturating_sub(start),
                cols: self.cols,
            });
        }
        Tensor::from_vec(
            end - start,
            self.cols,
            self.data[start * self.cols..end * self.cols].to_vec(),
        )
    }

    /// Stacks tensors with identical column counts along the row axis.
    pub fn cat_rows(tensors: &[Tensor]) -> TensorResult<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyInput("cat_rows"))?;
        let cols = first.cols;
        let mut rows = 0;
        for tensor in tensors {
            if tensor.cols != cols {
                return Err(TensorError::ShapeMismatch {
                    left: (tensor.rows, tensor.cols),
                    right: (first.rows, cols),
                });
            }
            rows += tensor.rows;
        }
        let mut data = Vec::with_capacity(rows * cols);
        for tensor in tensors {
            data.extend_from_slice(&tensor.data);
        }
        Tensor::from_vec(rows, cols, data)
    }

    fn assert_same_shape(&self, other: &Tensor) -> TensorResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Matrix product, parallelised over output rows.
    pub fn matmul(&self, other: &Tensor) -> TensorResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (m, k) = (self.rows, self.cols);
        let n = other.cols;
        let mut out = vec![0.0f32; m * n];
        out.par_chunks_mut(n).enumerate().for_each(|(row, out_row)| {
            let lhs_row = &self.data[row * k..(row + 1) * k];
            for (idx, &lhs) in lhs_row.iter().enumerate() {
                if lhs == 0.0 {
                    continue;
                }
                let rhs_row = &other.data[idx * n..(idx + 1) * n];
                for (out_value, &rhs) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *out_value += lhs * rhs;
                }
            }
        });
        Tensor::from_vec(m, n, out)
    }

    /// Returns the transposed tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.rows * self.cols];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.assert_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.assert_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a - b)
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Multiplies every element by a scalar.
    pub fn scale(&self, value: f32) -> TensorResult<Tensor> {
        let data = self.data.iter().map(|a| a * value).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.assert_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Accumulates `other * scale` into `self` in place.
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (value, update) in self.data.iter_mut().zip(other.data.iter()) {
            *value += update * scale;
        }
        Ok(())
    }

    /// Adds a bias row to every row of the tensor in place.
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> TensorResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for row in self.data.chunks_mut(self.cols) {
            for (value, b) in row.iter_mut().zip(bias.iter()) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Sums every column across rows, returning one value per column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.cols];
        for row in self.data.chunks(self.cols) {
            for (sum, value) in sums.iter_mut().zip(row.iter()) {
                *sum += value;
            }
        }
        sums
    }

    /// Squared L2 norm over every element.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Mean over every element.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Clamps every element into `[lo, hi]` in place.
    pub fn clamp_inplace(&mut self, lo: f32, hi: f32) {
        for value in &mut self.data {
            *value = value.clamp(lo, hi);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn constructors_reject_degenerate_shapes() {
        assert!(Tensor::zeros(0, 3).is_err());
        assert!(Tensor::from_vec(2, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn matmul_matches_manual_product() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn matmul_rejects_inner_mismatch() {
        let a = Tensor::zeros(2, 3).unwrap();
        let b = Tensor::zeros(2, 2).unwrap();
        assert!(matches!(
            a.matmul(&b),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn transpose_round_trips() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = a.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn cat_rows_stacks_batches() {
        let a = Tensor::from_vec(1, 2, vec![1.0, 2.0]).unwrap();
        let b = Tensor::from_vec(2, 2, vec![3.0, 4.0, 5.0, 6.0]).unwrap();
        let stacked = Tensor::cat_rows(&[a, b]).unwrap();
        assert_eq!(stacked.shape(), (3, 2));
        assert_eq!(stacked.row(2).unwrap(), &[5.0, 6.0]);
    }

    #[test]
    fn slice_rows_copies_the_requested_range() {
        let t = Tensor::from_fn(4, 2, |r, c| (r * 2 + c) as f32).unwrap();
        let tail = t.slice_rows(2, 4).unwrap();
        assert_eq!(tail.shape(), (2, 2));
        assert_eq!(tail.data(), &[4.0, 5.0, 6.0, 7.0]);
        assert!(t.slice_rows(3, 3).is_err());
    }

    #[test]
    fn random_uniform_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::random_uniform(4, 8, &mut rng).unwrap();
        assert!(t.data().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn random_normal_rejects_bad_std_dev() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(Tensor::random_normal(2, 2, 0.0, -1.0, &mut rng).is_err());
        let t = Tensor::random_normal(4, 4, 0.0, 0.5, &mut rng).unwrap();
        assert!(t.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn clamp_bounds_every_element() {
        let mut t = Tensor::from_vec(1, 4, vec![-0.5, 0.2, 0.9, 1.7]).unwrap();
        t.clamp_inplace(0.0, 1.0);
        assert_eq!(t.data(), &[0.0, 0.2, 0.9, 1.0]);
    }
}
