//! Row-major dense arrays owned by the trainers.

use std::ops::{Index, IndexMut};

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::math::norm;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n_rows: usize,
    n_columns: usize,
    data: Vec<f64>,
}

impl Matrix {
    #[must_use]
    pub fn zeros(n_rows: usize, n_columns: usize) -> Self {
        Self::filled(n_rows, n_columns, 0.0)
    }

    #[must_use]
    pub fn filled(n_rows: usize, n_columns: usize, value: f64) -> Self {
        Self {
            n_rows,
            n_columns,
            data: vec![value; n_rows * n_columns],
        }
    }

    /// Overwrites every element with a `N(0, std_dev²)` sample.
    pub fn fill_normal<R: Rng + ?Sized>(&mut self, std_dev: f64, rng: &mut R) -> Result {
        let distribution = Normal::new(0.0, std_dev)?;
        for value in &mut self.data {
            *value = distribution.sample(rng);
        }
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub const fn n_columns(&self) -> usize {
        self.n_columns
    }

    /// # Panics
    ///
    /// Panics when the row is out of bounds.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        assert!(i < self.n_rows, "row {} is out of bounds ({} rows)", i, self.n_rows);
        &self.data[i * self.n_columns..(i + 1) * self.n_columns]
    }

    /// # Panics
    ///
    /// Panics when the row is out of bounds.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        assert!(i < self.n_rows, "row {} is out of bounds ({} rows)", i, self.n_rows);
        &mut self.data[i * self.n_columns..(i + 1) * self.n_columns]
    }

    #[must_use]
    pub fn get_row(&self, i: usize) -> Option<&[f64]> {
        (i < self.n_rows).then(|| self.row(i))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // `chunks_exact` refuses a zero chunk size.
        self.data
            .chunks_exact(self.n_columns.max(1))
            .take(self.n_rows)
    }

    /// Frobenius norm.
    #[must_use]
    pub fn norm(&self) -> f64 {
        norm(&self.data)
    }

    /// Maximal absolute element-wise difference.
    #[must_use]
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        assert_eq!((self.n_rows, self.n_columns), (other.n_rows, other.n_columns));
        self.data
            .iter()
            .zip(&other.data)
            .fold(0.0, |max, (x, y)| f64::max(max, (x - y).abs()))
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.row(i)[j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        &mut self.row_mut(i)[j]
    }
}

/// Three-dimensional dense array, the last axis being contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    shape: (usize, usize, usize),
    data: Vec<f64>,
}

impl Tensor3 {
    #[must_use]
    pub fn zeros(n_i: usize, n_j: usize, n_k: usize) -> Self {
        Self {
            shape: (n_i, n_j, n_k),
            data: vec![0.0; n_i * n_j * n_k],
        }
    }

    #[must_use]
    pub const fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.data.iter_mut()
    }

    /// The contiguous `[i][j][..]` lane.
    ///
    /// # Panics
    ///
    /// Panics when the indices are out of bounds.
    #[must_use]
    pub fn lane(&self, i: usize, j: usize) -> &[f64] {
        let offset = self.offset(i, j, 0);
        &self.data[offset..offset + self.shape.2]
    }

    pub fn lane_mut(&mut self, i: usize, j: usize) -> &mut [f64] {
        let offset = self.offset(i, j, 0);
        &mut self.data[offset..offset + self.shape.2]
    }

    #[inline]
    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        let (n_i, n_j, n_k) = self.shape;
        assert!(
            i < n_i && j < n_j && k <= n_k,
            "index ({}, {}, {}) is out of bounds {:?}",
            i,
            j,
            k,
            self.shape,
        );
        (i * n_j + j) * n_k + k
    }
}

impl Index<(usize, usize, usize)> for Tensor3 {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &Self::Output {
        &self.lane(i, j)[k]
    }
}

impl IndexMut<(usize, usize, usize)> for Tensor3 {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.lane_mut(i, j)[k]
    }
}
