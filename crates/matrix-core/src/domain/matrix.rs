//! Square integer matrix stored in row-major order.

use serde::{Deserialize, Serialize};

/// An `n × n` grid of `i32` values stored row-major in one flat buffer.
///
/// The flat layout matches the wire encoding, so serialising a matrix is a
/// single pass over `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    n: usize,
    values: Vec<i32>,
}

impl Matrix {
    /// Builds a matrix from a flat row-major buffer.
    ///
    /// Returns `None` unless `values.len() == n * n`.
    pub fn from_flat(n: usize, values: Vec<i32>) -> Option<Self> {
        if n.checked_mul(n)? != values.len() {
            return None;
        }
        Some(Self { n, values })
    }

    /// Builds a matrix from nested rows.
    ///
    /// Returns `None` when the rows do not form a square.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use matrix_core::Matrix;
    ///
    /// let m = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
    /// assert_eq!(m.get(1, 0), 3);
    /// assert!(Matrix::from_rows(vec![vec![1, 2], vec![3]]).is_none());
    /// ```
    pub fn from_rows(rows: Vec<Vec<i32>>) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|row| row.len() != n) {
            return None;
        }
        Some(Self {
            n,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Side length of the matrix.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.values[row * self.n + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: i32) {
        self.values[row * self.n + col] = value;
    }

    /// Row-major view of every element.
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Iterates over the rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[i32]> {
        // `chunks` panics on a zero chunk size; an empty matrix has no rows.
        self.values.chunks(self.n.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<i32>> {
        self.rows().map(<[i32]>::to_vec).collect()
    }
}
