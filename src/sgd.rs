//! Matrix factorization trained by stochastic gradient descent.

use rand::rngs::StdRng;

pub use self::implicit::SvdPlusPlus;
pub use self::logistic::LogisticFactorization;
pub use self::model::LatentFactorModel;
pub use self::plain::ProbabilisticMatrixFactorization;
pub use self::social::SocialRegularization;
use crate::dataset::{InteractionRecord, InteractionStore};
use crate::evaluate::Rmse;
use crate::helpers::tracing::format_elapsed;
use crate::opts::parsers::{non_negative_f64, non_zero_usize, positive_f64};
use crate::prelude::*;

pub mod implicit;
pub mod logistic;
pub mod model;
pub mod plain;
pub mod social;

/// Latent factor options shared by the whole family.
#[derive(Debug, Copy, Clone, clap::Args)]
pub struct SgdFactorizationConfig {
    /// Number of latent factors
    #[arg(long = "factors", default_value_t = 10, value_parser = non_zero_usize)]
    pub n_factors: usize,

    /// Learning rate of the latent factors
    #[arg(long = "lr", default_value_t = 0.01, value_parser = positive_f64)]
    pub learning_rate: f64,

    /// Regularization of the user factors
    #[arg(long = "user-reg", default_value_t = 0.05, value_parser = non_negative_f64)]
    pub user_regularization: f64,

    /// Regularization of the item factors
    #[arg(long = "item-reg", default_value_t = 0.05, value_parser = non_negative_f64)]
    pub item_regularization: f64,

    /// Number of passes over the training set
    #[arg(long = "epochs", default_value_t = 30, value_parser = non_zero_usize)]
    pub n_epochs: usize,

    /// Random seed, drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for SgdFactorizationConfig {
    fn default() -> Self {
        Self {
            n_factors: 10,
            learning_rate: 0.01,
            user_regularization: 0.05,
            item_regularization: 0.05,
            n_epochs: 30,
            seed: None,
        }
    }
}

impl SgdFactorizationConfig {
    #[must_use]
    pub fn n_factors(mut self, n_factors: usize) -> Self {
        self.n_factors = n_factors;
        self
    }

    #[must_use]
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn regularization(mut self, user: f64, item: f64) -> Self {
        self.user_regularization = user;
        self.item_regularization = item;
        self
    }

    #[must_use]
    pub fn n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result {
        if self.n_factors == 0 {
            bail!("number of latent factors must be positive");
        }
        Ok(())
    }
}

/// Bias options of the biased variants.
///
/// The arguments carry their own IDs, so that they can be flattened next to [`SgdFactorizationConfig`].
#[derive(Debug, Copy, Clone, clap::Args)]
pub struct BiasConfig {
    /// Bias learning rate, relative to the factor learning rate
    #[arg(
        id = "bias_learning_rate",
        long = "bias-lr",
        default_value_t = 1.0,
        value_parser = positive_f64,
    )]
    pub learning_rate: f64,

    /// Regularization of the user biases
    #[arg(
        id = "bias_user_regularization",
        long = "bias-user-reg",
        default_value_t = 0.1,
        value_parser = non_negative_f64,
    )]
    pub user_regularization: f64,

    /// Regularization of the item biases
    #[arg(
        id = "bias_item_regularization",
        long = "bias-item-reg",
        default_value_t = 0.1,
        value_parser = non_negative_f64,
    )]
    pub item_regularization: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            user_regularization: 0.1,
            item_regularization: 0.1,
        }
    }
}

/// Visits every record once in a freshly shuffled order and reports the training RMSE.
///
/// The step updates the parameters touched by the record and returns its residual error.
pub(crate) fn run_epoch(
    epoch: usize,
    store: &InteractionStore,
    rng: &mut StdRng,
    mut step: impl FnMut(InteractionRecord) -> f64,
) -> Rmse {
    let start_instant = Instant::now();
    let mut error = Rmse::default();
    for position in store.random_permutation(rng) {
        error.push(step(store.record(position)));
    }
    info!(
        epoch,
        rmse = error.average(),
        elapsed = %format_elapsed(start_instant),
        "epoch done",
    );
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenario_store;
    use crate::helpers::seeded_rng;

    #[test]
    fn run_epoch_visits_every_record_once() {
        let store = scenario_store();
        let mut visited = Vec::new();
        let error = run_epoch(1, &store, &mut seeded_rng(Some(42)), |record| {
            visited.push((record.user_id, record.item_id));
            1.0
        });
        assert_eq!(error.count(), store.count());
        assert!((error.average() - 1.0).abs() < f64::EPSILON);
        assert_eq!(visited.into_iter().sorted().dedup().count(), store.count());
    }

    #[test]
    fn zero_factors_fails() {
        assert!(SgdFactorizationConfig::default().n_factors(0).validate().is_err());
    }
}
