//! Alternating least squares with weighted-λ regularization.
//!
//! See: Zhou et al., «Large-scale Parallel Collaborative Filtering for the Netflix Prize», 2008.

use nalgebra::{DMatrix, DVector};

use crate::dataset::{IndexedInteractions, InteractionStore};
use crate::evaluate::Rmse;
use crate::helpers::seeded_rng;
use crate::helpers::tracing::format_elapsed;
use crate::math::{dot, Matrix};
use crate::opts::parsers::{non_negative_f64, non_zero_usize};
use crate::predictor::RatingPredictor;
use crate::prelude::*;

#[derive(Debug, Copy, Clone, clap::Args)]
pub struct AlsConfig {
    /// Number of latent factors
    #[arg(long = "factors", default_value_t = 10, value_parser = non_zero_usize)]
    pub n_factors: usize,

    /// Regularization of the user factors, scaled by the user's rating count
    #[arg(long = "user-reg", default_value_t = 0.05, value_parser = non_negative_f64)]
    pub user_regularization: f64,

    /// Regularization of the item factors, scaled by the item's rating count
    #[arg(long = "item-reg", default_value_t = 0.05, value_parser = non_negative_f64)]
    pub item_regularization: f64,

    /// Number of user and item sweeps
    #[arg(long = "epochs", default_value_t = 15, value_parser = non_zero_usize)]
    pub n_epochs: usize,

    /// Random seed, drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            n_factors: 10,
            user_regularization: 0.05,
            item_regularization: 0.05,
            n_epochs: 15,
            seed: None,
        }
    }
}

pub struct AlternatingLeastSquares {
    data: IndexedInteractions,
    config: AlsConfig,
    user_factors: Matrix,
    item_factors: Matrix,
}

impl AlternatingLeastSquares {
    pub fn new(store: InteractionStore, config: AlsConfig) -> Result<Self> {
        if config.n_factors == 0 {
            bail!("number of latent factors must be positive");
        }
        let data = store.into_indexed_form()?;
        Ok(Self {
            user_factors: Matrix::zeros(data.n_users(), config.n_factors),
            item_factors: Matrix::zeros(data.n_items(), config.n_factors),
            data,
            config,
        })
    }

    #[must_use]
    pub const fn user_factors(&self) -> &Matrix {
        &self.user_factors
    }

    #[must_use]
    pub const fn item_factors(&self) -> &Matrix {
        &self.item_factors
    }

    /// Solves every user's normal equations with the item factors fixed, then every item's
    /// with the user factors fixed.
    pub fn sweep(&mut self) -> Result {
        for user_id in 0..self.data.n_users() {
            let events = self.data.user_events(user_id);
            let solution = solve(
                &self.item_factors,
                events.iter().map(|event| (event.item_id, event.rating)),
                self.config.user_regularization,
            )
            .with_context(|| format!("failed to fit user #{}", user_id))?;
            store_solution(self.user_factors.row_mut(user_id), solution);
        }
        for item_id in 0..self.data.n_items() {
            let events = self.data.item_events(item_id);
            let solution = solve(
                &self.user_factors,
                events.iter().map(|event| (event.user_id, event.rating)),
                self.config.item_regularization,
            )
            .with_context(|| format!("failed to fit item #{}", item_id))?;
            store_solution(self.item_factors.row_mut(item_id), solution);
        }
        Ok(())
    }

    fn training_error(&self) -> Rmse {
        let mut error = Rmse::default();
        for user_id in 0..self.data.n_users() {
            for event in self.data.user_events(user_id) {
                let prediction = dot(self.user_factors.row(user_id), self.item_factors.row(event.item_id));
                error.push(prediction - f64::from(event.rating));
            }
        }
        error
    }
}

/// Solves `(Σ v·vᵗ + λ·n·I)·x = Σ r·v` over the `n` fixed rows `v` rated `r`.
///
/// Returns `None` when there is nothing to fit.
fn solve(
    fixed: &Matrix,
    events: impl Iterator<Item = (usize, i32)>,
    regularization: f64,
) -> Result<Option<DVector<f64>>> {
    let n_factors = fixed.n_columns();
    let mut a = DMatrix::<f64>::zeros(n_factors, n_factors);
    let mut b = DVector::<f64>::zeros(n_factors);
    let mut n_events = 0_usize;
    for (id, rating) in events {
        let v = DVector::from_column_slice(fixed.row(id));
        a.ger(1.0, &v, &v, 1.0);
        b.axpy(f64::from(rating), &v, 1.0);
        n_events += 1;
    }
    if n_events == 0 {
        return Ok(None);
    }
    if regularization <= 0.0 && n_events < n_factors {
        bail!(
            "{} ratings cannot determine {} factors without regularization",
            n_events,
            n_factors,
        );
    }

    for i in 0..n_factors {
        a[(i, i)] += regularization * n_events as f64;
    }
    let cholesky = a
        .cholesky()
        .ok_or_else(|| anyhow!("normal equations are not positive definite"))?;
    Ok(Some(cholesky.solve(&b)))
}

/// Entities without ratings keep zero factors.
fn store_solution(row: &mut [f64], solution: Option<DVector<f64>>) {
    match solution {
        Some(solution) => row.copy_from_slice(solution.as_slice()),
        None => row.fill(0.0),
    }
}

impl RatingPredictor for AlternatingLeastSquares {
    #[instrument(level = "info", skip_all, fields(n_factors = self.config.n_factors))]
    fn train(&mut self) -> Result {
        let mut rng = seeded_rng(self.config.seed);
        self.user_factors.fill_normal(0.01, &mut rng)?;
        self.item_factors.fill_normal(0.01, &mut rng)?;

        for epoch in 1..=self.config.n_epochs {
            let start_instant = Instant::now();
            self.sweep()?;
            debug!(
                user_factors_norm = self.user_factors.norm(),
                item_factors_norm = self.item_factors.norm(),
                "swept",
            );
            info!(
                epoch,
                rmse = self.training_error().average(),
                elapsed = %format_elapsed(start_instant),
                "epoch done",
            );
        }
        Ok(())
    }

    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64 {
        match (self.user_factors.get_row(user_id), self.item_factors.get_row(item_id)) {
            (Some(user), Some(item)) => self.data.summary.bounds.apply(dot(user, item), bound),
            _ => self.data.summary.mean_rating,
        }
    }
}
