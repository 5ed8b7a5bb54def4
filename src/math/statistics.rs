use statrs::distribution::{Continuous, Normal};

use crate::prelude::*;

/// Lowest variance a Gaussian emission is allowed to collapse to.
pub const MIN_VARIANCE: f64 = 1e-6;

/// Density of `N(mean, variance)` at `x`.
pub fn gaussian_density(x: f64, mean: f64, variance: f64) -> Result<f64> {
    let distribution = Normal::new(mean, variance.max(MIN_VARIANCE).sqrt())
        .with_context(|| format!("invalid Gaussian ({}, {})", mean, variance))?;
    Ok(distribution.pdf(x))
}
