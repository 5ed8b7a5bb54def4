use rand_distr::{Distribution, Normal};

use crate::dataset::{InteractionStore, Summary};
use crate::helpers::seeded_rng;
use crate::opts::parsers::{non_zero_usize, positive_f64};
use crate::predictor::RatingPredictor;
use crate::prelude::*;
use crate::sgd::run_epoch;

#[derive(Debug, Copy, Clone, clap::Args)]
pub struct BaselineConfig {
    /// Number of passes over the training set
    #[arg(long = "epochs", default_value_t = 30, value_parser = non_zero_usize)]
    pub n_epochs: usize,

    /// Learning rate of the biases
    #[arg(long = "lr", default_value_t = 0.3, value_parser = positive_f64)]
    pub learning_rate: f64,

    /// Random seed, drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            n_epochs: 30,
            learning_rate: 0.3,
            seed: None,
        }
    }
}

/// `mean + user bias + item bias`, the biases fitted by stochastic gradient descent.
pub struct BiasedBaseline {
    store: InteractionStore,
    summary: Summary,
    config: BaselineConfig,
    user_bias: Vec<f64>,
    item_bias: Vec<f64>,
}

impl BiasedBaseline {
    pub fn new(store: InteractionStore, config: BaselineConfig) -> Result<Self> {
        let summary = store.summary()?;
        Ok(Self {
            store,
            summary,
            config,
            user_bias: vec![0.0; summary.n_users],
            item_bias: vec![0.0; summary.n_items],
        })
    }

    #[must_use]
    pub fn user_bias(&self) -> &[f64] {
        &self.user_bias
    }

    #[must_use]
    pub fn item_bias(&self) -> &[f64] {
        &self.item_bias
    }
}

impl RatingPredictor for BiasedBaseline {
    #[instrument(level = "info", skip_all, fields(n_epochs = self.config.n_epochs))]
    fn train(&mut self) -> Result {
        let mut rng = seeded_rng(self.config.seed);
        let distribution = Normal::new(0.0, 0.01)?;
        for bias in self.user_bias.iter_mut().chain(self.item_bias.iter_mut()) {
            *bias = distribution.sample(&mut rng);
        }

        let mean_rating = self.summary.mean_rating;
        // Steps are scaled by the squared learning rate.
        let learning_rate = self.config.learning_rate;
        let step_size = learning_rate * learning_rate;
        for epoch in 1..=self.config.n_epochs {
            let (user_bias, item_bias) = (&mut self.user_bias, &mut self.item_bias);
            run_epoch(epoch, &self.store, &mut rng, |record| {
                let user_bias = &mut user_bias[record.user_id];
                let item_bias = &mut item_bias[record.item_id];
                let residual_error = f64::from(record.rating) - (mean_rating + *user_bias + *item_bias);
                *user_bias += step_size * (residual_error - learning_rate * *user_bias);
                *item_bias += step_size * (residual_error - learning_rate * *item_bias);
                residual_error
            });
        }
        Ok(())
    }

    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64 {
        let prediction = self.summary.mean_rating
            + self.user_bias.get(user_id).copied().unwrap_or_default()
            + self.item_bias.get(item_id).copied().unwrap_or_default();
        self.summary.bounds.apply(prediction, bound)
    }
}
