use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::math::{dot, Matrix};
use crate::prelude::*;

/// Standard deviation of the initial factors and biases.
const INITIAL_STD_DEV: f64 = 0.01;

/// Dense latent factors with optional per-entity biases.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    pub user_factors: Matrix,
    pub item_factors: Matrix,

    /// Empty for the unbiased variants.
    pub user_bias: Vec<f64>,

    /// Empty for the unbiased variants.
    pub item_bias: Vec<f64>,

    pub global_bias: f64,
}

impl LatentFactorModel {
    /// Allocates zeroed parameters for every ID in `0..n_users` and `0..n_items`.
    #[must_use]
    pub fn new(n_users: usize, n_items: usize, n_factors: usize, with_biases: bool) -> Self {
        let (n_user_biases, n_item_biases) = if with_biases { (n_users, n_items) } else { (0, 0) };
        Self {
            user_factors: Matrix::zeros(n_users, n_factors),
            item_factors: Matrix::zeros(n_items, n_factors),
            user_bias: vec![0.0; n_user_biases],
            item_bias: vec![0.0; n_item_biases],
            global_bias: 0.0,
        }
    }

    /// Draws every factor and bias from `N(0, 0.01²)`.
    pub fn init<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result {
        self.user_factors.fill_normal(INITIAL_STD_DEV, rng)?;
        self.item_factors.fill_normal(INITIAL_STD_DEV, rng)?;
        let distribution = Normal::new(0.0, INITIAL_STD_DEV)?;
        for bias in self.user_bias.iter_mut().chain(self.item_bias.iter_mut()) {
            *bias = distribution.sample(rng);
        }
        Ok(())
    }

    #[must_use]
    pub fn n_factors(&self) -> usize {
        self.user_factors.n_columns()
    }

    /// Whether both IDs have trained parameters.
    #[must_use]
    pub fn contains(&self, user_id: usize, item_id: usize) -> bool {
        user_id < self.user_factors.n_rows() && item_id < self.item_factors.n_rows()
    }

    #[must_use]
    #[inline]
    pub fn dot(&self, user_id: usize, item_id: usize) -> f64 {
        dot(self.user_factors.row(user_id), self.item_factors.row(item_id))
    }

    /// Global bias plus the entity biases (if any) plus the factor dot product.
    #[must_use]
    #[inline]
    pub fn score(&self, user_id: usize, item_id: usize) -> f64 {
        self.global_bias
            + self.user_bias.get(user_id).copied().unwrap_or_default()
            + self.item_bias.get(item_id).copied().unwrap_or_default()
            + self.dot(user_id, item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::seeded_rng;

    #[test]
    fn unbiased_score_ok() {
        let mut model = LatentFactorModel::new(2, 3, 2, false);
        model.global_bias = 1.0;
        model.user_factors.row_mut(1).copy_from_slice(&[1.0, 2.0]);
        model.item_factors.row_mut(2).copy_from_slice(&[3.0, 4.0]);
        assert!((model.score(1, 2) - 12.0).abs() < f64::EPSILON);
        assert!(model.contains(1, 2));
        assert!(!model.contains(2, 0));
    }

    #[test]
    fn init_biases_ok() -> crate::Result {
        let mut model = LatentFactorModel::new(3, 2, 4, true);
        model.init(&mut seeded_rng(Some(42)))?;
        assert_eq!(model.user_bias.len(), 3);
        assert!(model.user_bias.iter().chain(&model.item_bias).all(|bias| bias.abs() < 0.1));
        assert!(model.item_bias.iter().any(|bias| *bias != 0.0));
        Ok(())
    }
}
