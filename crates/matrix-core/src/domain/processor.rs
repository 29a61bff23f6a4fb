//! Parallel column-minimum computation.
//!
//! For every index `i` in `0..n` the processor takes column `n - 1 - i` of
//! the input, finds its minimum, and writes that minimum back into cell
//! `(i, n - 1 - i)`, i.e. onto the anti-diagonal.
//!
//! # Two phases
//!
//! 1. **Gather** – the index range is split into `worker_count` contiguous
//!    chunks and each chunk's minima are computed on the thread pool.  This
//!    phase only reads the original matrix.
//! 2. **Scatter** – after every chunk has finished, the minima are written
//!    into a copy of the matrix sequentially.
//!
//! No write happens until every gather worker has joined, so every minimum is
//! computed from the unmodified input regardless of how the chunks interleave.

use std::ops::Range;
use std::time::Instant;

use rayon::ThreadPool;
use thiserror::Error;
use tracing::debug;

use crate::domain::matrix::Matrix;

/// Invalid job parameters detected before any worker is started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `n` must be positive.
    #[error("matrix side length must be positive")]
    InvalidDimension,

    /// `worker_count` must lie in `1..=n`.
    #[error("worker count {worker_count} is outside 1..={n}")]
    InvalidWorkerCount { worker_count: usize, n: usize },

    /// The matrix does not have the configured side length.
    #[error("matrix is {actual}x{actual} but the configuration expects {expected}x{expected}")]
    MatrixShape { expected: usize, actual: usize },
}

/// Checks the preconditions of [`column_minima_scatter`].
///
/// # Errors
///
/// Returns [`ConfigError`] when `n` is zero, the worker count is outside
/// `1..=n`, or the matrix side length differs from `n`.
pub fn validate(matrix: &Matrix, n: usize, worker_count: usize) -> Result<(), ConfigError> {
    if n == 0 {
        return Err(ConfigError::InvalidDimension);
    }
    if worker_count == 0 || worker_count > n {
        return Err(ConfigError::InvalidWorkerCount { worker_count, n });
    }
    if matrix.n() != n {
        return Err(ConfigError::MatrixShape {
            expected: n,
            actual: matrix.n(),
        });
    }
    Ok(())
}

/// Splits `0..n` into `workers` contiguous ranges.
///
/// Every range has `n / workers` indices; the first `n % workers` ranges get
/// one extra.  Returns an empty list when `workers` is zero.
///
/// # Examples
///
/// ```rust
/// use matrix_core::processor::chunk_ranges;
///
/// assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..5, 5..7]);
/// ```
pub fn chunk_ranges(n: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let base = n / workers;
    let extra = n % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let len = base + usize::from(w < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Runs the gather/scatter computation on `pool` and returns the new matrix.
///
/// The input is never modified; the result is a copy with the anti-diagonal
/// overwritten.  The output is identical for every valid `worker_count`.
///
/// # Errors
///
/// Returns [`ConfigError`] without starting any worker when the
/// preconditions checked by [`validate`] do not hold.
pub fn column_minima_scatter(
    matrix: &Matrix,
    n: usize,
    worker_count: usize,
    pool: &ThreadPool,
) -> Result<Matrix, ConfigError> {
    validate(matrix, n, worker_count)?;

    let started = Instant::now();
    let ranges = chunk_ranges(n, worker_count);
    let mut min_values = vec![0i32; n];

    // Gather: each worker owns a disjoint slice of `min_values`.
    pool.scope(|scope| {
        let mut rest = min_values.as_mut_slice();
        for range in ranges {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            rest = tail;
            scope.spawn(move |_| gather_chunk(matrix, range, chunk));
        }
    });
    debug!(
        "gather phase complete: n={n}, workers={worker_count}, {}us",
        started.elapsed().as_micros()
    );

    // Scatter: sequential, after every worker has joined.
    let mut result = matrix.clone();
    for (i, min) in min_values.into_iter().enumerate() {
        result.set(i, n - 1 - i, min);
    }
    Ok(result)
}

/// Computes the minima for the indices in `range` into `out`.
fn gather_chunk(matrix: &Matrix, range: Range<usize>, out: &mut [i32]) {
    let n = matrix.n();
    for (slot, i) in out.iter_mut().zip(range) {
        let col = n - 1 - i;
        *slot = (0..n).fold(i32::MAX, |acc, row| acc.min(matrix.get(row, col)));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
